//! ARC4.
//!
//! # Warning
//!
//! ARC4 is broken. It is provided for compatibility with existing
//! formats only.

#![forbid(unsafe_code)]

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// The capability implemented by stream cipher contexts.
pub trait StreamCipher {
    /// XORs the keystream into `input` and writes the result to
    /// `output`, advancing the keystream.
    ///
    /// Encryption and decryption are the same operation.
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<()>;

    /// Rewinds the keystream to the state right after keying.
    fn reset(&mut self);
}

#[derive(Clone, Zeroize)]
struct State {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl State {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, usize::from(j));
        }
        Self { s, i: 0, j: 0 }
    }

    fn next(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[usize::from(self.i)]);
        self.s.swap(usize::from(self.i), usize::from(self.j));
        let idx = self.s[usize::from(self.i)].wrapping_add(self.s[usize::from(self.j)]);
        self.s[usize::from(idx)]
    }
}

/// An ARC4 context.
///
/// The context remembers its initial state so that
/// [`reset`][StreamCipher::reset] can rewind the keystream.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Arc4Context {
    initial: State,
    current: State,
}

impl Arc4Context {
    /// The shortest accepted key in bytes.
    pub const MIN_KEY_SIZE: usize = 5;
    /// The longest accepted key in bytes.
    pub const MAX_KEY_SIZE: usize = 256;

    /// Keys a new context.
    pub fn new(key: &[u8]) -> Result<Self> {
        if !cfg!(feature = "arc4") {
            return Err(Error::Unsupported);
        }
        if !(Self::MIN_KEY_SIZE..=Self::MAX_KEY_SIZE).contains(&key.len()) {
            debug!(len = key.len(), "invalid ARC4 key length");
            return Err(Error::InvalidKeyLength);
        }
        let initial = State::new(key);
        Ok(Self {
            current: initial.clone(),
            initial,
        })
    }
}

impl StreamCipher for Arc4Context {
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let output = output
            .get_mut(..input.len())
            .ok_or(Error::BufferTooSmall {
                required: input.len(),
            })?;
        for (o, i) in output.iter_mut().zip(input) {
            *o = i ^ self.current.next();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.current.clone_from(&self.initial);
    }
}

#[cfg(all(test, feature = "arc4"))]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_known_answers() {
        let cases: [(&[u8], &[u8], &[u8]); 2] = [
            (
                b"Key\0\0",
                b"Plaintext",
                &[0x04, 0x5e, 0x13, 0x7b, 0xda, 0xa8, 0x8a, 0xa8, 0xf7],
            ),
            (
                b"Secret",
                b"Attack at dawn",
                &[
                    0x45, 0xa0, 0x1f, 0x64, 0x5f, 0xc3, 0x5b, 0x38, 0x35, 0x52, 0x54, 0x4b, 0x9b,
                    0xf5,
                ],
            ),
        ];
        for (key, pt, want) in cases {
            let mut ctx = Arc4Context::new(key).unwrap();
            let mut ct = vec![0u8; pt.len()];
            ctx.process(pt, &mut ct).unwrap();
            assert_eq!(ct, want);
        }
    }

    #[test]
    fn test_reset_rewinds_keystream() {
        let mut ctx = Arc4Context::new(b"0123456789").unwrap();
        let pt = [0u8; 32];
        let mut first = [0u8; 32];
        ctx.process(&pt, &mut first).unwrap();

        // Without a reset the keystream continues.
        let mut second = [0u8; 32];
        ctx.process(&pt, &mut second).unwrap();
        assert_ne!(first, second);

        ctx.reset();
        let mut again = [0u8; 32];
        ctx.process(&pt, &mut again).unwrap();
        assert_eq!(first, again);

        // Decryption is encryption.
        ctx.reset();
        let mut back = [0u8; 32];
        ctx.process(&first, &mut back).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn test_key_size_bounds() {
        assert_eq!(
            Arc4Context::new(&[1; 4]).err(),
            Some(Error::InvalidKeyLength)
        );
        assert_eq!(
            Arc4Context::new(&[1; 257]).err(),
            Some(Error::InvalidKeyLength)
        );
        assert!(Arc4Context::new(&[1; 5]).is_ok());
        assert!(Arc4Context::new(&[1; 256]).is_ok());
    }

    #[test]
    fn test_short_output() {
        let mut ctx = Arc4Context::new(b"abcde").unwrap();
        let mut out = [0u8; 3];
        assert_eq!(
            ctx.process(b"four", &mut out),
            Err(Error::BufferTooSmall { required: 4 })
        );
    }
}
