//! Public key cryptography: RSA and Diffie-Hellman.
//!
//! Both context types are owned handles. Dropping one zeroizes
//! its secret components.

#![forbid(unsafe_code)]

mod dh;
mod rsa;

use ::rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use tracing::debug;

pub use self::{
    dh::{DhContext, DhGenerator},
    rsa::{RsaContext, RsaKeyTag},
};
use crate::{
    algorithm::HashAlgorithm,
    error::{Error, Result},
};

/// Returns the RSASSA-PKCS1-v1_5 scheme for `alg`.
pub(crate) fn pkcs1v15_scheme(alg: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    let scheme = match alg {
        #[cfg(feature = "md5")]
        HashAlgorithm::Md5 => Pkcs1v15Sign::new::<md5::Md5>(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        #[allow(unreachable_patterns, reason = "depends on features")]
        _ => {
            debug!(%alg, "no PKCS#1 v1.5 encoding for hash");
            return Err(Error::Unsupported);
        }
    };
    Ok(scheme)
}

/// Verifies an RSASSA-PKCS1-v1_5 signature over the `alg`
/// digest `hashed`.
pub(crate) fn verify_pkcs1(
    key: &RsaPublicKey,
    alg: HashAlgorithm,
    hashed: &[u8],
    sig: &[u8],
) -> Result<()> {
    if hashed.len() != alg.digest_size() {
        return Err(Error::InvalidLength);
    }
    key.verify(pkcs1v15_scheme(alg)?, hashed, sig)
        .map_err(Error::from)
}
