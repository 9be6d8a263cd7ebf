//! The sized output protocol.
//!
//! Variable-length results are written into caller-provided
//! buffers. The buffer's length is its capacity. If the capacity
//! is too small the operation fails with
//! [`Error::BufferTooSmall`] and nothing is written, so callers
//! can probe with an empty buffer, allocate exactly `required`
//! bytes, and call again.

#![forbid(unsafe_code)]

use tracing::debug;

use crate::error::{Error, Result};

/// Copies `src` into the front of `out`.
///
/// Returns the number of bytes written, which is always
/// `src.len()`.
pub fn write_sized(src: &[u8], out: &mut [u8]) -> Result<usize> {
    let dst = reserve(src.len(), out)?;
    dst.copy_from_slice(src);
    Ok(src.len())
}

/// Writes `src` into the front of `out`, left-padded with zeros
/// to `width` bytes.
///
/// `src` must not be longer than `width`.
pub fn write_padded(src: &[u8], width: usize, out: &mut [u8]) -> Result<usize> {
    let pad = width
        .checked_sub(src.len())
        .ok_or(Error::InvalidArgument("value wider than field"))?;
    let dst = reserve(width, out)?;
    let (zeros, rest) = dst.split_at_mut(pad);
    zeros.fill(0);
    rest.copy_from_slice(src);
    Ok(width)
}

/// Writes the concatenation of `parts` into `out`.
///
/// Like [`write_sized`], nothing is written unless all of the
/// parts fit.
pub fn write_all_sized(parts: &[&[u8]], out: &mut [u8]) -> Result<usize> {
    let required = parts
        .iter()
        .try_fold(0usize, |acc, p| acc.checked_add(p.len()))
        .ok_or(Error::InvalidArgument("output length overflows"))?;
    let mut dst = reserve(required, out)?;
    for part in parts {
        let (head, tail) = dst.split_at_mut(part.len());
        head.copy_from_slice(part);
        dst = tail;
    }
    Ok(required)
}

/// Returns the first `required` bytes of `out`, or
/// [`Error::BufferTooSmall`].
fn reserve(required: usize, out: &mut [u8]) -> Result<&mut [u8]> {
    let capacity = out.len();
    out.get_mut(..required).ok_or_else(|| {
        debug!(required, capacity, "output buffer too small");
        Error::BufferTooSmall { required }
    })
}
