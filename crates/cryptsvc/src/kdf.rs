//! PKCS#5 password-based key derivation.

#![forbid(unsafe_code)]

use sha1::Sha1;
use sha2::Sha256;
use tracing::debug;

use crate::error::{Error, Result};

/// Derives `out.len()` bytes from `password` and `salt` with
/// PBKDF2.
///
/// The PRF is HMAC over the hash whose digest is `digest_size`
/// bytes long: 20 selects SHA-1 and 32 selects SHA-256.
pub fn pbkdf2(
    password: &[u8],
    salt: &[u8],
    iterations: usize,
    digest_size: usize,
    out: &mut [u8],
) -> Result<()> {
    let rounds = u32::try_from(iterations)
        .ok()
        .filter(|&n| n > 0)
        .ok_or(Error::InvalidArgument("iteration count out of range"))?;
    if out.is_empty() {
        return Err(Error::InvalidLength);
    }
    match digest_size {
        20 => pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, rounds, out),
        32 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, out),
        _ => {
            debug!(digest_size, "no PBKDF2 PRF for digest size");
            return Err(Error::Unsupported);
        }
    }
    Ok(())
}
