//! HMAC.

#![forbid(unsafe_code)]

use hmac::{Hmac, Mac as _};
use sha1::Sha1;
use sha2::Sha256;
use tracing::debug;

use crate::{
    algorithm::MacAlgorithm,
    error::{Error, Result},
    hash::StreamingDigest,
    sized,
};

#[derive(Clone)]
enum MacState {
    #[cfg(feature = "md5")]
    Md5(Hmac<md5::Md5>),
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
}

macro_rules! with_state {
    ($state:expr, $m:ident => $body:expr) => {
        match $state {
            #[cfg(feature = "md5")]
            MacState::Md5($m) => $body,
            MacState::Sha1($m) => $body,
            MacState::Sha256($m) => $body,
        }
    };
}

/// An HMAC context.
///
/// The context moves through three states:
///
/// 1. Unkeyed, after [`new`][Self::new].
/// 2. Ready, after [`init`][Self::init]. Updates are accepted.
/// 3. Finalized, after
///    [`finalize_into`][StreamingDigest::finalize_into]. Only
///    [`init`][Self::init] is accepted.
#[derive(Clone)]
pub struct HmacContext {
    alg: MacAlgorithm,
    state: Option<MacState>,
}

impl HmacContext {
    /// Creates an unkeyed context for `alg`.
    pub fn new(alg: MacAlgorithm) -> Result<Self> {
        if !alg.is_supported() {
            debug!(?alg, "MAC compiled out");
            return Err(Error::Unsupported);
        }
        Ok(Self { alg, state: None })
    }

    /// Creates a context for `alg` keyed with `key`.
    pub fn with_key(alg: MacAlgorithm, key: &[u8]) -> Result<Self> {
        let mut ctx = Self::new(alg)?;
        ctx.init(key)?;
        Ok(ctx)
    }

    /// (Re)keys the context with `key`, discarding any previous
    /// state.
    ///
    /// Keys of any length are accepted. Keys longer than the
    /// hash's block size are hashed first.
    pub fn init(&mut self, key: &[u8]) -> Result<()> {
        let state = match self.alg {
            #[cfg(feature = "md5")]
            MacAlgorithm::HmacMd5 => MacState::Md5(new_mac(key)?),
            MacAlgorithm::HmacSha1 => MacState::Sha1(new_mac(key)?),
            MacAlgorithm::HmacSha256 => MacState::Sha256(new_mac(key)?),
            #[allow(unreachable_patterns, reason = "depends on features")]
            _ => return Err(Error::Unsupported),
        };
        self.state = Some(state);
        Ok(())
    }

    /// The MAC algorithm.
    pub const fn algorithm(&self) -> MacAlgorithm {
        self.alg
    }

    /// Reports whether the context is keyed and not yet
    /// finalized.
    pub const fn is_ready(&self) -> bool {
        self.state.is_some()
    }
}

fn new_mac<M: hmac::digest::KeyInit>(key: &[u8]) -> Result<M> {
    M::new_from_slice(key).map_err(|_| Error::InvalidKeyLength)
}

impl StreamingDigest for HmacContext {
    fn output_size(&self) -> usize {
        self.alg.tag_size()
    }

    fn update(&mut self, data: &[u8]) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or(Error::InvalidArgument("HMAC context not keyed"))?;
        with_state!(state, m => m.update(data));
        Ok(())
    }

    fn finalize_into(&mut self, out: &mut [u8]) -> Result<usize> {
        let size = self.output_size();
        if out.len() < size {
            return Err(Error::BufferTooSmall { required: size });
        }
        let state = self
            .state
            .take()
            .ok_or(Error::InvalidArgument("HMAC context not keyed"))?;
        with_state!(state, m => sized::write_sized(&m.finalize().into_bytes(), out))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::hash::MAX_DIGEST_SIZE;

    fn tag(alg: MacAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut ctx = HmacContext::with_key(alg, key).unwrap();
        ctx.update(data).unwrap();
        ctx.finalize().unwrap().to_vec()
    }

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    /// RFC 2202 and RFC 4231, test case 2.
    #[test]
    fn test_known_answers() {
        let key = b"Jefe";
        let data = b"what do ya want for nothing?";
        assert_eq!(
            tag(MacAlgorithm::HmacSha1, key, data),
            unhex("effcdf6ae5eb2fa2d27416d5f184df9c259a7c79")
        );
        assert_eq!(
            tag(MacAlgorithm::HmacSha256, key, data),
            unhex("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
        if cfg!(feature = "md5") {
            assert_eq!(
                tag(MacAlgorithm::HmacMd5, key, data),
                unhex("750c783e6ab0b503eaa86e310a5db738")
            );
        }
    }

    /// RFC 4231, test case 6: a key longer than the block size.
    #[test]
    fn test_long_key() {
        let key = [0xaa; 131];
        let data = b"Test Using Larger Than Block-Size Key - Hash Key First";
        assert_eq!(
            tag(MacAlgorithm::HmacSha256, &key, data),
            unhex("60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54")
        );
    }

    #[test]
    fn test_lifecycle() {
        let mut ctx = HmacContext::new(MacAlgorithm::HmacSha256).unwrap();
        assert!(!ctx.is_ready());
        assert!(ctx.update(b"data").is_err());

        ctx.init(b"key").unwrap();
        ctx.update(b"data").unwrap();
        let mut dup = ctx.clone();
        let mut out = [0u8; MAX_DIGEST_SIZE];
        let n = ctx.finalize_into(&mut out).unwrap();
        assert_eq!(n, 32);
        assert_eq!(dup.finalize().unwrap().as_slice(), &out[..n]);

        // Finalized until re-keyed.
        assert!(ctx.update(b"more").is_err());
        ctx.init(b"key").unwrap();
        ctx.update(b"data").unwrap();
        assert_eq!(ctx.finalize().unwrap().as_slice(), &out[..n]);
    }
}
