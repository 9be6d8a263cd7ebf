#![forbid(unsafe_code)]
#![allow(clippy::arithmetic_side_effects, reason = "big integer arithmetic")]

use alloc::vec;
use core::str;

use ::rsa::{
    BigUint, RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::DecodePrivateKey,
    traits::{PrivateKeyParts, PublicKeyParts},
};
use num_bigint_dig::prime::probably_prime;
use num_integer::Integer;
use num_traits::{One, Zero};
use tracing::{debug, instrument};
use zeroize::{Zeroize, Zeroizing};

use super::{pkcs1v15_scheme, verify_pkcs1};
use crate::{
    algorithm::HashAlgorithm,
    error::{Error, Result},
    random::RandomGenerator,
    sized,
};

/// The default public exponent, F4.
const DEFAULT_EXPONENT: u32 = 0x10001;

/// Miller-Rabin rounds used by [`RsaContext::check_key`].
const PRIME_ROUNDS: usize = 20;

/// Identifies an RSA key component.
///
/// The discriminants are stable and must never be renumbered.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RsaKeyTag {
    /// The modulus.
    N = 0,
    /// The public exponent.
    E = 1,
    /// The private exponent.
    D = 2,
    /// The first prime.
    P = 3,
    /// The second prime.
    Q = 4,
    /// `d mod (p - 1)`.
    Dp = 5,
    /// `d mod (q - 1)`.
    Dq = 6,
    /// `q^-1 mod p`.
    QInv = 7,
}

impl RsaKeyTag {
    /// Every tag.
    pub const ALL: [Self; 8] = [
        Self::N,
        Self::E,
        Self::D,
        Self::P,
        Self::Q,
        Self::Dp,
        Self::Dq,
        Self::QInv,
    ];

    /// Returns the tag with the stable identifier `id`.
    pub fn from_u32(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| *tag as u32 == id)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// An RSA key, assembled one component at a time.
///
/// Any component may be absent. Operations fail with
/// [`Error::MissingKey`] when a component they need is absent.
#[derive(Clone, Default)]
pub struct RsaContext {
    components: [Option<BigUint>; 8],
}

impl Drop for RsaContext {
    fn drop(&mut self) {
        self.components.zeroize();
    }
}

impl RsaContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context holding every component of `key`.
    pub fn from_private_key(key: &RsaPrivateKey) -> Result<Self> {
        let [p, q] = key.primes() else {
            debug!(n = key.primes().len(), "multi-prime keys are not supported");
            return Err(Error::Unsupported);
        };
        let mut ctx = Self::from_public_key(key);
        ctx.set(RsaKeyTag::D, key.d().clone());
        ctx.set(RsaKeyTag::P, p.clone());
        ctx.set(RsaKeyTag::Q, q.clone());
        ctx.fill_crt()?;
        Ok(ctx)
    }

    /// Creates a context holding the components of `key`.
    pub fn from_public_key(key: &impl PublicKeyParts) -> Self {
        let mut ctx = Self::new();
        ctx.set(RsaKeyTag::N, key.n().clone());
        ctx.set(RsaKeyTag::E, key.e().clone());
        ctx
    }

    /// Parses a PEM-encoded private key.
    ///
    /// Accepts `RSA PRIVATE KEY` (PKCS#1), `PRIVATE KEY` (PKCS#8)
    /// and `ENCRYPTED PRIVATE KEY` (PKCS#8 with PBES2). The
    /// password is required for the last and ignored otherwise.
    #[instrument(skip_all)]
    pub fn from_private_key_pem(pem: &[u8], password: Option<&[u8]>) -> Result<Self> {
        let label = der::pem::decode_label(pem).map_err(|err| {
            debug!(%err, "not PEM");
            Error::Malformed
        })?;
        let s = str::from_utf8(pem).map_err(|_| Error::Malformed)?;
        let key = match label {
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(s).map_err(|err| {
                debug!(%err, "invalid PKCS#1 private key");
                Error::Malformed
            })?,
            "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_pem(s)?,
            "ENCRYPTED PRIVATE KEY" => {
                let password = password.ok_or(Error::InvalidArgument("password required"))?;
                RsaPrivateKey::from_pkcs8_encrypted_pem(s, password)?
            }
            _ => {
                debug!(label, "unexpected PEM label");
                return Err(Error::Malformed);
            }
        };
        Self::from_private_key(&key)
    }

    fn get(&self, tag: RsaKeyTag) -> Option<&BigUint> {
        self.components.get(tag.index())?.as_ref()
    }

    fn require(&self, tag: RsaKeyTag) -> Result<&BigUint> {
        self.get(tag).ok_or_else(|| {
            debug!(?tag, "missing RSA key component");
            Error::MissingKey
        })
    }

    fn set(&mut self, tag: RsaKeyTag, value: BigUint) {
        if let Some(slot) = self.components.get_mut(tag.index()) {
            if let Some(old) = slot.as_mut() {
                old.zeroize();
            }
            *slot = Some(value);
        }
    }

    /// Sets the `tag` component to the big-endian integer
    /// `value`, or clears it if `value` is `None` or empty.
    pub fn set_key(&mut self, tag: RsaKeyTag, value: Option<&[u8]>) {
        match value {
            Some(bytes) if !bytes.is_empty() => self.set(tag, BigUint::from_bytes_be(bytes)),
            _ => {
                if let Some(slot) = self.components.get_mut(tag.index()) {
                    slot.zeroize();
                    *slot = None;
                }
            }
        }
    }

    /// Writes the `tag` component to `out` as a big-endian
    /// integer and returns its length.
    ///
    /// An absent component has length zero.
    pub fn get_key(&self, tag: RsaKeyTag, out: &mut [u8]) -> Result<usize> {
        match self.get(tag) {
            None => Ok(0),
            Some(v) => {
                let bytes = Zeroizing::new(v.to_bytes_be());
                sized::write_sized(&bytes, out)
            }
        }
    }

    /// Generates a fresh `bits`-bit key with the big-endian
    /// public exponent `exponent` (65537 by default).
    ///
    /// Every component is replaced.
    #[instrument(skip(self, rng, exponent))]
    pub fn generate_key(
        &mut self,
        rng: &mut RandomGenerator,
        bits: usize,
        exponent: Option<&[u8]>,
    ) -> Result<()> {
        if bits < 64 {
            return Err(Error::InvalidArgument("modulus too small"));
        }
        let e = match exponent {
            Some(bytes) if !bytes.is_empty() => BigUint::from_bytes_be(bytes),
            _ => BigUint::from(DEFAULT_EXPONENT),
        };
        // Even exponents have no inverse, so generation would
        // never finish.
        if e.is_even() || e <= BigUint::one() {
            debug!("public exponent must be odd and greater than one");
            return Err(Error::InvalidArgument("invalid public exponent"));
        }
        let key = RsaPrivateKey::new_with_exp(rng.rng()?, bits, &e)?;
        *self = Self::from_private_key(&key)?;
        Ok(())
    }

    /// Computes whichever CRT components are absent from `d`, `p`
    /// and `q`.
    fn fill_crt(&mut self) -> Result<()> {
        let d = self.require(RsaKeyTag::D)?.clone();
        let p = self.require(RsaKeyTag::P)?.clone();
        let q = self.require(RsaKeyTag::Q)?.clone();
        let one = BigUint::one();
        if p <= one || q <= one {
            return Err(Error::InvalidArgument("invalid RSA prime"));
        }
        if self.get(RsaKeyTag::Dp).is_none() {
            self.set(RsaKeyTag::Dp, &d % (&p - &one));
        }
        if self.get(RsaKeyTag::Dq).is_none() {
            self.set(RsaKeyTag::Dq, &d % (&q - &one));
        }
        if self.get(RsaKeyTag::QInv).is_none() {
            // p is prime, so q^(p-2) is the inverse of q.
            self.set(RsaKeyTag::QInv, q.modpow(&(&p - 2u32), &p));
        }
        Ok(())
    }

    /// Checks that the private key is mathematically consistent.
    ///
    /// `p` and `q` must be probable primes, `n = p*q` and
    /// `d*e ≡ 1 mod lcm(p-1, q-1)`. CRT components, if present,
    /// must agree with `d`, `p` and `q`. A context without its
    /// private components fails with [`Error::MissingKey`].
    #[instrument(skip_all)]
    pub fn check_key(&self) -> Result<()> {
        let n = self.require(RsaKeyTag::N)?;
        let e = self.require(RsaKeyTag::E)?;
        let d = self.require(RsaKeyTag::D)?;
        let p = self.require(RsaKeyTag::P)?;
        let q = self.require(RsaKeyTag::Q)?;

        let fail = |why: &'static str| {
            debug!(why, "RSA key check failed");
            Err(Error::Verification)
        };

        let one = BigUint::one();
        if *p <= one || *q <= one {
            return fail("prime out of range");
        }
        if !probably_prime(p, PRIME_ROUNDS) || !probably_prime(q, PRIME_ROUNDS) {
            return fail("factor not prime");
        }
        if &(p * q) != n {
            return fail("n != p*q");
        }
        let p1 = p - &one;
        let q1 = q - &one;
        let lambda = p1.lcm(&q1);
        if lambda.is_zero() || !((d * e) % &lambda).is_one() {
            return fail("d*e != 1 mod lcm(p-1, q-1)");
        }
        if self.get(RsaKeyTag::Dp).is_some_and(|dp| *dp != d % &p1) {
            return fail("dp mismatch");
        }
        if self.get(RsaKeyTag::Dq).is_some_and(|dq| *dq != d % &q1) {
            return fail("dq mismatch");
        }
        if self
            .get(RsaKeyTag::QInv)
            .is_some_and(|qinv| !((qinv * q) % p).is_one())
        {
            return fail("qinv mismatch");
        }
        Ok(())
    }

    /// Returns the public key.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        let n = self.require(RsaKeyTag::N)?.clone();
        let e = self.require(RsaKeyTag::E)?.clone();
        Ok(RsaPublicKey::new_with_max_size(n, e, MAX_MODULUS_BITS)?)
    }

    fn private_key(&self) -> Result<RsaPrivateKey> {
        let n = self.require(RsaKeyTag::N)?.clone();
        let e = self.require(RsaKeyTag::E)?.clone();
        let d = self.require(RsaKeyTag::D)?.clone();
        let primes = match (self.get(RsaKeyTag::P), self.get(RsaKeyTag::Q)) {
            (Some(p), Some(q)) => vec![p.clone(), q.clone()],
            _ => vec![],
        };
        Ok(RsaPrivateKey::from_components(n, e, d, primes)?)
    }

    /// The size in bytes of the modulus.
    pub fn size(&self) -> Result<usize> {
        let n = self.require(RsaKeyTag::N)?;
        Ok(n.bits().div_ceil(8))
    }

    /// Signs the MD5, SHA-1 or SHA-256 digest `hash` with
    /// RSASSA-PKCS1-v1_5 and writes the signature to `sig`.
    ///
    /// The digest algorithm is implied by `hash.len()`. The
    /// signature is exactly [`size`][Self::size] bytes.
    #[instrument(skip_all, fields(hash_len = hash.len()))]
    pub fn pkcs1_sign(&self, hash: &[u8], sig: &mut [u8]) -> Result<usize> {
        let alg = pkcs1_hash(hash)?;
        let size = self.size()?;
        if sig.len() < size {
            return Err(Error::BufferTooSmall { required: size });
        }
        let key = self.private_key()?;
        let out = key.sign(pkcs1v15_scheme(alg)?, hash)?;
        sized::write_sized(&out, sig)
    }

    /// Verifies an RSASSA-PKCS1-v1_5 signature over the MD5,
    /// SHA-1 or SHA-256 digest `hash`.
    #[instrument(skip_all, fields(hash_len = hash.len()))]
    pub fn pkcs1_verify(&self, hash: &[u8], sig: &[u8]) -> Result<()> {
        let alg = pkcs1_hash(hash)?;
        let key = self.public_key()?;
        verify_pkcs1(&key, alg, hash, sig)
    }
}

/// The largest modulus accepted for public key operations.
const MAX_MODULUS_BITS: usize = 16384;

fn pkcs1_hash(hash: &[u8]) -> Result<HashAlgorithm> {
    let alg = HashAlgorithm::for_pkcs1_digest(hash.len()).ok_or_else(|| {
        debug!(len = hash.len(), "not an MD5, SHA-1 or SHA-256 digest");
        Error::InvalidLength
    })?;
    if !alg.is_supported() {
        return Err(Error::Unsupported);
    }
    Ok(alg)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::{hash::digest, test_util::fixtures};

    fn leaf_key() -> RsaContext {
        RsaContext::from_private_key_pem(fixtures::LEAF_KEY_PEM, None).unwrap()
    }

    #[test]
    fn test_generate_check_sign_verify() {
        let mut rng = RandomGenerator::with_seed(&[7u8; 32]);
        let mut ctx = RsaContext::new();
        ctx.generate_key(&mut rng, 2048, None).unwrap();
        ctx.check_key().unwrap();
        assert_eq!(ctx.size().unwrap(), 256);

        let mut e = [0u8; 8];
        let n = ctx.get_key(RsaKeyTag::E, &mut e).unwrap();
        assert_eq!(&e[..n], &[0x01, 0x00, 0x01]);

        let hash = digest(HashAlgorithm::Sha256, b"message").unwrap();
        let mut sig = [0u8; 256];
        assert_eq!(ctx.pkcs1_sign(&hash, &mut sig).unwrap(), 256);
        ctx.pkcs1_verify(&hash, &sig).unwrap();

        // Only the public half is needed to verify.
        let mut public = RsaContext::new();
        for tag in [RsaKeyTag::N, RsaKeyTag::E] {
            let mut buf = [0u8; 256];
            let n = ctx.get_key(tag, &mut buf).unwrap();
            public.set_key(tag, Some(&buf[..n]));
        }
        public.pkcs1_verify(&hash, &sig).unwrap();
        assert_eq!(public.check_key(), Err(Error::MissingKey));

        for i in [0, 100, 255] {
            let mut bad = sig;
            bad[i] ^= 0x01;
            assert_eq!(public.pkcs1_verify(&hash, &bad), Err(Error::Verification));
        }
        for i in [0, 31] {
            let mut bad = hash.clone();
            bad[i] ^= 0x80;
            assert_eq!(public.pkcs1_verify(&bad, &sig), Err(Error::Verification));
        }
    }

    #[test]
    fn test_generate_requires_seed() {
        let mut rng = RandomGenerator::new();
        assert_eq!(
            RsaContext::new().generate_key(&mut rng, 512, None),
            Err(Error::NotSeeded)
        );
    }

    #[test]
    fn test_generate_rejects_even_exponent() {
        let mut rng = RandomGenerator::with_seed(b"seed");
        assert!(matches!(
            RsaContext::new().generate_key(&mut rng, 512, Some(&[0x01, 0x00])),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_get_key_sized() {
        let ctx = leaf_key();
        let mut empty = [0u8; 0];
        let Err(Error::BufferTooSmall { required }) = ctx.get_key(RsaKeyTag::N, &mut empty) else {
            panic!("expected BufferTooSmall");
        };
        assert_eq!(required, 256);
        let mut buf = vec![0u8; required];
        assert_eq!(ctx.get_key(RsaKeyTag::N, &mut buf), Ok(required));

        // Absent components are empty.
        let mut cleared = ctx.clone();
        cleared.set_key(RsaKeyTag::D, None);
        assert_eq!(cleared.get_key(RsaKeyTag::D, &mut buf), Ok(0));
    }

    #[test]
    fn test_check_key_detects_tampering() {
        let ctx = leaf_key();
        ctx.check_key().unwrap();

        let mut buf = [0u8; 256];
        let n = ctx.get_key(RsaKeyTag::D, &mut buf).unwrap();
        buf[n - 1] ^= 0x02;
        let mut bad = ctx.clone();
        bad.set_key(RsaKeyTag::D, Some(&buf[..n]));
        assert_eq!(bad.check_key(), Err(Error::Verification));

        let mut bad = ctx.clone();
        bad.set_key(RsaKeyTag::Dp, Some(&[3]));
        assert_eq!(bad.check_key(), Err(Error::Verification));
    }

    #[test]
    fn test_sign_checks_hash_length_first() {
        let ctx = leaf_key();
        let mut sig = [0u8; 256];
        assert_eq!(
            ctx.pkcs1_sign(&[0u8; 48], &mut sig),
            Err(Error::InvalidLength)
        );
        // Even with no key at all.
        assert_eq!(
            RsaContext::new().pkcs1_sign(&[0u8; 17], &mut sig),
            Err(Error::InvalidLength)
        );
        assert_eq!(
            ctx.pkcs1_sign(&[0u8; 32], &mut sig[..255]),
            Err(Error::BufferTooSmall { required: 256 })
        );
    }

    #[test]
    fn test_all_digest_sizes() {
        let ctx = leaf_key();
        let mut sig = [0u8; 256];
        for alg in [HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
            if !alg.is_supported() {
                continue;
            }
            let hash = digest(alg, b"abc").unwrap();
            ctx.pkcs1_sign(&hash, &mut sig).unwrap();
            ctx.pkcs1_verify(&hash, &sig).unwrap();
        }
    }

    #[test]
    fn test_pem_formats_agree() {
        let pkcs1 = leaf_key();
        let pkcs8 = RsaContext::from_private_key_pem(fixtures::LEAF_KEY_PKCS8_PEM, None).unwrap();
        let encrypted = RsaContext::from_private_key_pem(
            fixtures::LEAF_KEY_ENCRYPTED_PEM,
            Some(fixtures::LEAF_KEY_PASSWORD),
        )
        .unwrap();
        for tag in RsaKeyTag::ALL {
            let (mut a, mut b, mut c) = ([0u8; 256], [0u8; 256], [0u8; 256]);
            let na = pkcs1.get_key(tag, &mut a).unwrap();
            let nb = pkcs8.get_key(tag, &mut b).unwrap();
            let nc = encrypted.get_key(tag, &mut c).unwrap();
            assert!(na > 0, "{tag:?}");
            assert_eq!(&a[..na], &b[..nb], "{tag:?}");
            assert_eq!(&a[..na], &c[..nc], "{tag:?}");
        }
    }

    #[test]
    fn test_pem_bad_password() {
        assert!(
            RsaContext::from_private_key_pem(fixtures::LEAF_KEY_ENCRYPTED_PEM, Some(b"wrong"))
                .is_err()
        );
        assert!(matches!(
            RsaContext::from_private_key_pem(fixtures::LEAF_KEY_ENCRYPTED_PEM, None),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            RsaContext::from_private_key_pem(b"not pem", None).err(),
            Some(Error::Malformed)
        );
    }
}
