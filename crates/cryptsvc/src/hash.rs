//! Cryptographic hash functions.
//!
//! # Warning
//!
//! MD4, MD5 and SHA-1 are broken. They are provided for
//! compatibility with existing formats only.

#![forbid(unsafe_code)]

use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use tracing::debug;

use crate::{
    algorithm::HashAlgorithm,
    error::{Error, Result},
    sized,
};

/// The largest digest produced by any supported hash.
pub const MAX_DIGEST_SIZE: usize = 64;

/// A digest.
pub type Digest = heapless::Vec<u8, MAX_DIGEST_SIZE>;

/// The capability shared by streaming digests and MACs.
///
/// A context starts out ready, accepts any number of
/// [`update`][Self::update] calls and is consumed by
/// [`finalize_into`][Self::finalize_into]. Duplicating a context
/// is [`Clone`].
pub trait StreamingDigest: Clone {
    /// The size in bytes of the output.
    fn output_size(&self) -> usize;

    /// Feeds `data` into the running computation.
    ///
    /// An empty `data` is a no-op.
    fn update(&mut self, data: &[u8]) -> Result<()>;

    /// Completes the computation and writes the output to the
    /// front of `out`.
    ///
    /// Afterward the context is finalized and further updates
    /// fail until it is initialized again.
    fn finalize_into(&mut self, out: &mut [u8]) -> Result<usize>;

    /// Like [`finalize_into`][Self::finalize_into], but returns
    /// the output.
    fn finalize(&mut self) -> Result<Digest> {
        let mut buf = [0u8; MAX_DIGEST_SIZE];
        let n = self.finalize_into(&mut buf)?;
        let out = buf.get(..n).ok_or(Error::InvalidLength)?;
        Digest::from_slice(out).map_err(|()| Error::InvalidLength)
    }
}

#[derive(Clone)]
enum HashState {
    #[cfg(feature = "md4")]
    Md4(md4::Md4),
    #[cfg(feature = "md5")]
    Md5(md5::Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// Invokes `$body` with `$h` bound to the concrete hash state.
macro_rules! with_state {
    ($state:expr, $h:ident => $body:expr) => {
        match $state {
            #[cfg(feature = "md4")]
            HashState::Md4($h) => $body,
            #[cfg(feature = "md5")]
            HashState::Md5($h) => $body,
            HashState::Sha1($h) => $body,
            HashState::Sha256($h) => $body,
            HashState::Sha384($h) => $body,
            HashState::Sha512($h) => $body,
        }
    };
}

/// An in-progress hash computation.
#[derive(Clone)]
pub struct HashContext {
    alg: HashAlgorithm,
    // `None` after finalization.
    state: Option<HashState>,
}

impl HashContext {
    /// Creates a context for `alg`.
    ///
    /// Fails with [`Error::Unsupported`] if `alg` is compiled
    /// out.
    pub fn new(alg: HashAlgorithm) -> Result<Self> {
        let state = match alg {
            #[cfg(feature = "md4")]
            HashAlgorithm::Md4 => HashState::Md4(md4::Md4::new()),
            #[cfg(feature = "md5")]
            HashAlgorithm::Md5 => HashState::Md5(md5::Md5::new()),
            HashAlgorithm::Sha1 => HashState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HashState::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => HashState::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => HashState::Sha512(Sha512::new()),
            #[allow(unreachable_patterns, reason = "depends on features")]
            _ => {
                debug!(%alg, "hash compiled out");
                return Err(Error::Unsupported);
            }
        };
        Ok(Self {
            alg,
            state: Some(state),
        })
    }

    /// The hash algorithm.
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.alg
    }

    /// Reports whether the context has been finalized.
    pub const fn is_finalized(&self) -> bool {
        self.state.is_none()
    }
}

impl StreamingDigest for HashContext {
    fn output_size(&self) -> usize {
        self.alg.digest_size()
    }

    fn update(&mut self, data: &[u8]) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or(Error::InvalidArgument("hash context already finalized"))?;
        with_state!(state, h => h.update(data));
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
            .ok_or(Error::InvalidArgument("hash context already finalized"))?;
        with_state!(state, h => sized::write_sized(&h.finalize(), out))
    }
}

/// Computes the `alg` digest of `data` in one shot and writes it
/// to the front of `out`.
pub fn hash_all(alg: HashAlgorithm, data: &[u8], out: &mut [u8]) -> Result<usize> {
    let mut ctx = HashContext::new(alg)?;
    ctx.update(data)?;
    ctx.finalize_into(out)
}

/// Like [`hash_all`], but returns the digest.
pub fn digest(alg: HashAlgorithm, data: &[u8]) -> Result<Digest> {
    let mut ctx = HashContext::new(alg)?;
    ctx.update(data)?;
    ctx.finalize()
}
