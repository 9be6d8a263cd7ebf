#![forbid(unsafe_code)]
#![allow(clippy::arithmetic_side_effects, reason = "big integer arithmetic")]

use ::rsa::BigUint;
use num_bigint_dig::{RandBigInt, RandPrime, prime::probably_prime};
use num_traits::One;
use tracing::{debug, instrument};
use zeroize::Zeroize;

use crate::{
    error::{Error, Result},
    random::RandomGenerator,
    sized,
};

/// Miller-Rabin rounds for each of the two primality tests in
/// the safe prime check.
const PRIME_ROUNDS: usize = 20;

/// The smallest accepted prime, in bits.
const MIN_PRIME_BITS: usize = 64;
/// The largest accepted prime, in bits.
const MAX_PRIME_BITS: usize = 8192;

/// A supported Diffie-Hellman generator.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DhGenerator {
    /// g = 2.
    Two = 2,
    /// g = 5.
    Five = 5,
}

impl TryFrom<usize> for DhGenerator {
    type Error = Error;

    fn try_from(g: usize) -> Result<Self> {
        match g {
            2 => Ok(Self::Two),
            5 => Ok(Self::Five),
            _ => {
                debug!(g, "unsupported DH generator");
                Err(Error::Unsupported)
            }
        }
    }
}

/// Diffie-Hellman over a safe prime group.
///
/// A context moves from empty, to parameterized (by
/// [`generate_parameter`][Self::generate_parameter] or
/// [`set_parameter`][Self::set_parameter]), to holding a private
/// key (by [`generate_key`][Self::generate_key]).
#[derive(Default)]
pub struct DhContext {
    p: Option<BigUint>,
    g: Option<BigUint>,
    x: Option<BigUint>,
}

impl Drop for DhContext {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}

/// Reports whether `p` is a safe prime: `p` and `(p - 1) / 2`
/// are both probable primes.
///
/// Each test is [`PRIME_ROUNDS`] Miller-Rabin rounds plus a
/// Lucas test.
fn is_safe_prime(p: &BigUint) -> bool {
    probably_prime(p, PRIME_ROUNDS) && probably_prime(&((p - 1u32) >> 1usize), PRIME_ROUNDS)
}

impl DhContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    fn prime(&self) -> Result<&BigUint> {
        self.p.as_ref().ok_or(Error::MissingKey)
    }

    /// The size in bytes of the prime, which is also the size of
    /// every public value and shared secret.
    pub fn size(&self) -> Result<usize> {
        Ok(self.prime()?.bits().div_ceil(8))
    }

    /// Generates a fresh `prime_bits`-bit safe prime for the
    /// generator `g` and writes it to `prime`.
    #[instrument(skip(self, rng, prime))]
    pub fn generate_parameter(
        &mut self,
        rng: &mut RandomGenerator,
        g: usize,
        prime_bits: usize,
        prime: &mut [u8],
    ) -> Result<usize> {
        let g = DhGenerator::try_from(g)?;
        check_prime_bits(prime_bits)?;
        let width = prime_bits.div_ceil(8);
        if prime.len() < width {
            return Err(Error::BufferTooSmall { required: width });
        }
        let rng = rng.rng()?;
        let p = loop {
            // `gen_prime` sets the top two bits, so 2q+1 has
            // exactly `prime_bits` bits.
            let q = rng.gen_prime(prime_bits - 1);
            let p = (q << 1usize) + 1u32;
            if probably_prime(&p, PRIME_ROUNDS) {
                break p;
            }
        };
        debug!(bits = p.bits(), "generated safe prime");
        let n = sized::write_padded(&p.to_bytes_be(), width, prime)?;
        self.install(p, g);
        Ok(n)
    }

    /// Sets the group to the big-endian safe prime `prime` and
    /// the generator `g`.
    ///
    /// Fails if `prime` is not a safe prime or if `g` is not
    /// suitable for it.
    #[instrument(skip(self, prime))]
    pub fn set_parameter(&mut self, g: usize, prime: &[u8]) -> Result<()> {
        let g = DhGenerator::try_from(g)?;
        let p = BigUint::from_bytes_be(prime);
        check_prime_bits(p.bits())?;
        if !is_safe_prime(&p) {
            debug!("not a safe prime");
            return Err(Error::InvalidArgument("not a safe prime"));
        }
        let gv = BigUint::from(g as u32);
        if gv >= &p - 1u32 {
            return Err(Error::InvalidArgument("unsuitable generator"));
        }
        self.install(p, g);
        Ok(())
    }

    fn install(&mut self, p: BigUint, g: DhGenerator) {
        self.x.zeroize();
        self.p = Some(p);
        self.g = Some(BigUint::from(g as u32));
    }

    /// Generates a private key and writes the public value
    /// `g^x mod p` to `public`.
    #[instrument(skip_all)]
    pub fn generate_key(&mut self, rng: &mut RandomGenerator, public: &mut [u8]) -> Result<usize> {
        let p = self.prime()?;
        let g = self.g.as_ref().ok_or(Error::MissingKey)?;
        let width = p.bits().div_ceil(8);
        if public.len() < width {
            return Err(Error::BufferTooSmall { required: width });
        }
        let two = BigUint::from(2u32);
        let x = rng.rng()?.gen_biguint_range(&two, &(p - 1u32));
        let y = g.modpow(&x, p);
        let n = sized::write_padded(&y.to_bytes_be(), width, public)?;
        self.x.zeroize();
        self.x = Some(x);
        Ok(n)
    }

    /// Computes the shared secret `peer^x mod p` and writes it to
    /// `key`.
    ///
    /// `peer` must lie strictly between 1 and `p - 1`.
    #[instrument(skip_all)]
    pub fn compute_key(&self, peer: &[u8], key: &mut [u8]) -> Result<usize> {
        let p = self.prime()?;
        let x = self.x.as_ref().ok_or(Error::MissingKey)?;
        let y = BigUint::from_bytes_be(peer);
        if y <= BigUint::one() || y >= p - 1u32 {
            debug!("peer public value out of range");
            return Err(Error::InvalidArgument("peer public value out of range"));
        }
        let width = p.bits().div_ceil(8);
        if key.len() < width {
            return Err(Error::BufferTooSmall { required: width });
        }
        let mut z = y.modpow(x, p);
        let bytes = zeroize::Zeroizing::new(z.to_bytes_be());
        z.zeroize();
        sized::write_padded(&bytes, width, key)
    }
}

fn check_prime_bits(bits: usize) -> Result<()> {
    if !(MIN_PRIME_BITS..=MAX_PRIME_BITS).contains(&bits) {
        debug!(bits, "DH prime size out of range");
        return Err(Error::InvalidArgument("prime size out of range"));
    }
    Ok(())
}
