//! Block ciphers in ECB and CBC modes.
//!
//! No padding is performed. Inputs must be a whole number of
//! blocks.

#![forbid(unsafe_code)]

use aes::{Aes128, Aes192, Aes256};
use cipher::{
    Block, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit, generic_array::GenericArray,
};
use tracing::debug;

use crate::{
    algorithm::CipherAlgorithm,
    error::{Error, Result},
};

/// The capability implemented by block cipher contexts.
pub trait BlockCipher {
    /// The block size in bytes.
    fn block_size(&self) -> usize;

    /// Encrypts `input` into `output` in ECB mode.
    fn ecb_encrypt(&self, input: &[u8], output: &mut [u8]) -> Result<()>;

    /// Decrypts `input` into `output` in ECB mode.
    fn ecb_decrypt(&self, input: &[u8], output: &mut [u8]) -> Result<()>;

    /// Encrypts `input` into `output` in CBC mode.
    ///
    /// `iv` must be exactly one block.
    fn cbc_encrypt(&self, input: &[u8], iv: &[u8], output: &mut [u8]) -> Result<()>;

    /// Decrypts `input` into `output` in CBC mode.
    ///
    /// `iv` must be exactly one block.
    fn cbc_decrypt(&self, input: &[u8], iv: &[u8], output: &mut [u8]) -> Result<()>;
}

#[derive(Clone)]
enum Keyed {
    #[cfg(feature = "tdes")]
    Tdes2(des::TdesEde2),
    #[cfg(feature = "tdes")]
    Tdes3(des::TdesEde3),
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

macro_rules! with_cipher {
    ($keyed:expr, $c:ident => $body:expr) => {
        match $keyed {
            #[cfg(feature = "tdes")]
            Keyed::Tdes2($c) => $body,
            #[cfg(feature = "tdes")]
            Keyed::Tdes3($c) => $body,
            Keyed::Aes128($c) => $body,
            Keyed::Aes192($c) => $body,
            Keyed::Aes256($c) => $body,
        }
    };
}

/// A keyed Triple-DES or AES context.
#[derive(Clone)]
pub struct BlockCipherContext {
    alg: CipherAlgorithm,
    keyed: Keyed,
}

impl BlockCipherContext {
    /// Creates a context for `alg` from the first `key_bits / 8`
    /// bytes of `key`.
    ///
    /// Triple-DES accepts 64 bits (K1=K2=K3), 128 bits (K1=K3)
    /// and 192 bits. AES accepts 128, 192 and 256 bits.
    pub fn new(alg: CipherAlgorithm, key: &[u8], key_bits: usize) -> Result<Self> {
        if !alg.is_supported() || alg == CipherAlgorithm::Arc4 {
            debug!(?alg, "not a supported block cipher");
            return Err(Error::Unsupported);
        }
        if !alg.is_valid_key_bits(key_bits) {
            debug!(?alg, key_bits, "invalid key length");
            return Err(Error::InvalidKeyLength);
        }
        let key = key.get(..key_bits / 8).ok_or(Error::InvalidKeyLength)?;
        let keyed = match (alg, key_bits) {
            #[cfg(feature = "tdes")]
            (CipherAlgorithm::Tdes, 64) => {
                let mut k = [0u8; 24];
                for chunk in k.chunks_exact_mut(8) {
                    chunk.copy_from_slice(key);
                }
                Keyed::Tdes3(init(&k)?)
            }
            #[cfg(feature = "tdes")]
            (CipherAlgorithm::Tdes, 128) => Keyed::Tdes2(init(key)?),
            #[cfg(feature = "tdes")]
            (CipherAlgorithm::Tdes, 192) => Keyed::Tdes3(init(key)?),
            (CipherAlgorithm::Aes, 128) => Keyed::Aes128(init(key)?),
            (CipherAlgorithm::Aes, 192) => Keyed::Aes192(init(key)?),
            (CipherAlgorithm::Aes, 256) => Keyed::Aes256(init(key)?),
            _ => return Err(Error::InvalidKeyLength),
        };
        Ok(Self { alg, keyed })
    }

    /// The cipher.
    pub const fn algorithm(&self) -> CipherAlgorithm {
        self.alg
    }
}

fn init<C: KeyInit>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| Error::InvalidKeyLength)
}

impl BlockCipher for BlockCipherContext {
    fn block_size(&self) -> usize {
        self.alg.block_size()
    }

    fn ecb_encrypt(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        with_cipher!(&self.keyed, c => ecb(c, input, output, Direction::Encrypt))
    }

    fn ecb_decrypt(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        with_cipher!(&self.keyed, c => ecb(c, input, output, Direction::Decrypt))
    }

    fn cbc_encrypt(&self, input: &[u8], iv: &[u8], output: &mut [u8]) -> Result<()> {
        with_cipher!(&self.keyed, c => cbc_encrypt(c, input, iv, output))
    }

    fn cbc_decrypt(&self, input: &[u8], iv: &[u8], output: &mut [u8]) -> Result<()> {
        with_cipher!(&self.keyed, c => cbc_decrypt(c, input, iv, output))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Checks the shared length rules and returns the part of
/// `output` that will be written.
fn check_lengths<'a, C: BlockSizeUser>(
    input: &[u8],
    output: &'a mut [u8],
) -> Result<&'a mut [u8]> {
    let bs = C::block_size();
    if input.is_empty() || input.len() % bs != 0 {
        debug!(len = input.len(), block_size = bs, "input not a whole number of blocks");
        return Err(Error::InvalidLength);
    }
    output.get_mut(..input.len()).ok_or(Error::BufferTooSmall {
        required: input.len(),
    })
}

fn ecb<C>(c: &C, input: &[u8], output: &mut [u8], dir: Direction) -> Result<()>
where
    C: BlockEncrypt + BlockDecrypt,
{
    let output = check_lengths::<C>(input, output)?;
    output.copy_from_slice(input);
    for chunk in output.chunks_exact_mut(C::block_size()) {
        let block = GenericArray::from_mut_slice(chunk);
        match dir {
            Direction::Encrypt => c.encrypt_block(block),
            Direction::Decrypt => c.decrypt_block(block),
        }
    }
    Ok(())
}

fn check_iv<C: BlockSizeUser>(iv: &[u8]) -> Result<Block<C>> {
    if iv.len() != C::block_size() {
        debug!(len = iv.len(), "IV must be exactly one block");
        return Err(Error::InvalidLength);
    }
    Ok(GenericArray::clone_from_slice(iv))
}

fn cbc_encrypt<C>(c: &C, input: &[u8], iv: &[u8], output: &mut [u8]) -> Result<()>
where
    C: BlockEncrypt,
{
    let mut prev = check_iv::<C>(iv)?;
    let output = check_lengths::<C>(input, output)?;
    let bs = C::block_size();
    for (src, dst) in input.chunks_exact(bs).zip(output.chunks_exact_mut(bs)) {
        for ((d, s), p) in dst.iter_mut().zip(src).zip(prev.iter()) {
            *d = s ^ p;
        }
        let block = GenericArray::from_mut_slice(dst);
        c.encrypt_block(block);
        prev.copy_from_slice(&block[..]);
    }
    Ok(())
}

fn cbc_decrypt<C>(c: &C, input: &[u8], iv: &[u8], output: &mut [u8]) -> Result<()>
where
    C: BlockDecrypt,
{
    let mut prev = check_iv::<C>(iv)?;
    let output = check_lengths::<C>(input, output)?;
    let bs = C::block_size();
    for (src, dst) in input.chunks_exact(bs).zip(output.chunks_exact_mut(bs)) {
        dst.copy_from_slice(src);
        let block = GenericArray::from_mut_slice(dst);
        c.decrypt_block(block);
        for (d, p) in block.iter_mut().zip(prev.iter()) {
            *d ^= p;
        }
        prev.copy_from_slice(src);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_log::test;

    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    /// FIPS 197, appendix C.
    #[test]
    fn test_aes_known_answers() {
        let pt = unhex("00112233445566778899aabbccddeeff");
        let key = unhex("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");
        let cases = [
            (128, "69c4e0d86a7b0430d8cdb78070b4c55a"),
            (192, "dda97ca4864cdfe06eaf70a0ec0d7191"),
            (256, "8ea2b7ca516745bfeafc49904b496089"),
        ];
        for (bits, want) in cases {
            let ctx = BlockCipherContext::new(CipherAlgorithm::Aes, &key, bits).unwrap();
            let mut ct = [0u8; 16];
            ctx.ecb_encrypt(&pt, &mut ct).unwrap();
            assert_eq!(ct.as_slice(), unhex(want), "AES-{bits}");

            let mut got = [0u8; 16];
            ctx.ecb_decrypt(&ct, &mut got).unwrap();
            assert_eq!(got.as_slice(), pt);
        }
    }

    /// NIST SP 800-38A, F.2.1.
    #[test]
    fn test_aes_cbc_known_answer() {
        let key = unhex("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = unhex("000102030405060708090a0b0c0d0e0f");
        let pt = unhex("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
        let want = unhex("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2");
        let ctx = BlockCipherContext::new(CipherAlgorithm::Aes, &key, 128).unwrap();
        let mut ct = vec![0u8; pt.len()];
        ctx.cbc_encrypt(&pt, &iv, &mut ct).unwrap();
        assert_eq!(ct, want);
    }

    #[test]
    #[cfg(feature = "tdes")]
    fn test_tdes_keying_options() {
        let k1 = unhex("0123456789abcdef");
        let k2 = unhex("23456789abcdef01");
        let pt = unhex("4e6f772069732074");

        // One key is single DES.
        let one = BlockCipherContext::new(CipherAlgorithm::Tdes, &k1, 64).unwrap();
        let mut ct = [0u8; 8];
        one.ecb_encrypt(&pt, &mut ct).unwrap();
        assert_eq!(ct.as_slice(), unhex("3fa40e8a984d4815"));

        // Two-key is three-key with K3=K1.
        let two_key = [k1.clone(), k2.clone()].concat();
        let three_key = [k1.clone(), k2, k1].concat();
        let two = BlockCipherContext::new(CipherAlgorithm::Tdes, &two_key, 128).unwrap();
        let three = BlockCipherContext::new(CipherAlgorithm::Tdes, &three_key, 192).unwrap();
        let (mut a, mut b) = ([0u8; 8], [0u8; 8]);
        two.ecb_encrypt(&pt, &mut a).unwrap();
        three.ecb_encrypt(&pt, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_key_bits() {
        let key = [0u8; 32];
        for bits in [0, 64, 100, 160, 512] {
            assert_eq!(
                BlockCipherContext::new(CipherAlgorithm::Aes, &key, bits).err(),
                Some(Error::InvalidKeyLength),
                "{bits}"
            );
        }
        // Too few key bytes for the requested length.
        assert_eq!(
            BlockCipherContext::new(CipherAlgorithm::Aes, &key[..16], 256).err(),
            Some(Error::InvalidKeyLength)
        );
        assert_eq!(
            BlockCipherContext::new(CipherAlgorithm::Arc4, &key, 128).err(),
            Some(Error::Unsupported)
        );
    }

    #[test]
    fn test_rejects_partial_blocks() {
        let ctx = BlockCipherContext::new(CipherAlgorithm::Aes, &[7u8; 16], 128).unwrap();
        let iv = [0u8; 16];
        let mut out = [0u8; 64];
        for len in [0, 1, 15, 17, 31] {
            let input = vec![0u8; len];
            assert_eq!(ctx.ecb_encrypt(&input, &mut out), Err(Error::InvalidLength));
            assert_eq!(
                ctx.cbc_decrypt(&input, &iv, &mut out),
                Err(Error::InvalidLength)
            );
        }
        // IV must be exactly one block.
        assert_eq!(
            ctx.cbc_encrypt(&[0u8; 16], &iv[..8], &mut out),
            Err(Error::InvalidLength)
        );
        // Output must hold the whole input.
        assert_eq!(
            ctx.ecb_encrypt(&[0u8; 32], &mut out[..16]),
            Err(Error::BufferTooSmall { required: 32 })
        );
    }

    fn cipher_and_key() -> impl Strategy<Value = (CipherAlgorithm, usize, Vec<u8>)> {
        let mut options = vec![
            (CipherAlgorithm::Aes, 128),
            (CipherAlgorithm::Aes, 192),
            (CipherAlgorithm::Aes, 256),
        ];
        if cfg!(feature = "tdes") {
            options.extend([
                (CipherAlgorithm::Tdes, 64),
                (CipherAlgorithm::Tdes, 128),
                (CipherAlgorithm::Tdes, 192),
            ]);
        }
        proptest::sample::select(options).prop_flat_map(|(alg, bits)| {
            proptest::collection::vec(any::<u8>(), bits / 8).prop_map(move |key| (alg, bits, key))
        })
    }

    proptest! {
        #[test]
        fn test_cbc_round_trip(
            (alg, bits, key) in cipher_and_key(),
            blocks in 1usize..8,
            seed in any::<u8>(),
        ) {
            let ctx = BlockCipherContext::new(alg, &key, bits).unwrap();
            let bs = ctx.block_size();
            let pt = (0..blocks * bs).map(|i| (i as u8) ^ seed).collect::<Vec<_>>();
            let iv = vec![seed; bs];

            let mut ct = vec![0u8; pt.len()];
            ctx.cbc_encrypt(&pt, &iv, &mut ct).unwrap();
            let mut got = vec![0u8; pt.len()];
            ctx.cbc_decrypt(&ct, &iv, &mut got).unwrap();
            prop_assert_eq!(&got, &pt);

            ctx.ecb_encrypt(&pt, &mut ct).unwrap();
            ctx.ecb_decrypt(&ct, &mut got).unwrap();
            prop_assert_eq!(got, pt);
        }
    }
}
