//! Caller buffers and library-allocated buffers.

use alloc::{boxed::Box, vec};
use core::{
    ffi::{CStr, c_char},
    mem::size_of,
    ptr, slice,
};

use crate::{
    error::{Error, InvalidPtr, Result},
    slot::check_ptr,
};

/// Returns the `len` items at `ptr`.
///
/// If `len` is zero `ptr` may be null.
///
/// # Safety
///
/// - If `len` is non-zero, `ptr` must be valid for reads of
///   `len` items.
/// - You must uphold Rust's aliasing rules.
pub(crate) unsafe fn items<'a, T>(ptr: *const T, len: usize) -> Result<&'a [T], InvalidPtr> {
    if len == 0 {
        return Ok(&[]);
    }
    let ptr = check_ptr(ptr.cast_mut())?;
    // SAFETY: `ptr` is non-null and aligned. See the function's
    // safety docs for the rest.
    Ok(unsafe { slice::from_raw_parts(ptr, len) })
}

/// Returns the `len` bytes at `ptr`.
///
/// # Safety
///
/// See [`items`].
pub(crate) unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8], InvalidPtr> {
    // SAFETY: See the function's safety docs.
    unsafe { items(ptr, len) }
}

/// Like [`bytes`], but a null `ptr` is `None`.
///
/// # Safety
///
/// See [`bytes`].
pub(crate) unsafe fn opt_bytes<'a>(ptr: *const u8, len: usize) -> Result<Option<&'a [u8]>, InvalidPtr> {
    if ptr.is_null() {
        Ok(None)
    } else {
        // SAFETY: See the function's safety docs.
        unsafe { bytes(ptr, len) }.map(Some)
    }
}

/// Returns the `len` writable bytes at `ptr`.
///
/// # Safety
///
/// - If `len` is non-zero, `ptr` must be valid for reads and
///   writes of `len` bytes.
/// - You must uphold Rust's aliasing rules.
pub(crate) unsafe fn bytes_mut<'a>(ptr: *mut u8, len: usize) -> Result<&'a mut [u8], InvalidPtr> {
    if len == 0 {
        return Ok(&mut []);
    }
    let ptr = check_ptr(ptr)?;
    // SAFETY: `ptr` is non-null. See the function's safety docs
    // for the rest.
    Ok(unsafe { slice::from_raw_parts_mut(ptr, len) })
}

/// Returns the NUL-terminated string at `ptr`, without the NUL,
/// or `None` if `ptr` is null.
///
/// # Safety
///
/// - If non-null, `ptr` must point to a NUL-terminated string.
pub(crate) unsafe fn opt_cstr<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: See the function's safety docs.
    Some(unsafe { CStr::from_ptr(ptr) }.to_bytes())
}

/// Returns an exclusive reference from `ptr`.
///
/// # Safety
///
/// - If non-null and aligned, `ptr` must be valid for reads and
///   writes.
/// - You must uphold Rust's aliasing rules.
pub(crate) unsafe fn out<'a, T>(ptr: *mut T) -> Result<&'a mut T, InvalidPtr> {
    let ptr = check_ptr(ptr)?;
    // SAFETY: `ptr` is non-null and aligned. See the function's
    // safety docs for the rest.
    Ok(unsafe { &mut *ptr })
}

/// Runs `f` over the caller's `(buf, *size)` pair.
///
/// On entry `*size` is the capacity of `buf`. On success it is
/// updated to the number of bytes written. If `buf` is too small
/// it is updated to the required capacity and `buf` is left
/// untouched.
///
/// # Safety
///
/// - `size` must be valid for reads and writes.
/// - If `*size` is non-zero, `buf` must be valid for reads and
///   writes of `*size` bytes.
pub(crate) unsafe fn write_sized<F>(buf: *mut u8, size: *mut usize, f: F) -> Result<()>
where
    F: FnOnce(&mut [u8]) -> cryptsvc::Result<usize>,
{
    // SAFETY: See the function's safety docs.
    let size = unsafe { out(size)? };
    // SAFETY: See the function's safety docs.
    let dst = unsafe { bytes_mut(buf, *size)? };
    match f(dst) {
        Ok(n) => {
            *size = n;
            Ok(())
        }
        Err(err) => {
            if let cryptsvc::Error::BufferTooSmall { required } = err {
                *size = required;
            }
            Err(err.into())
        }
    }
}

/// Prefixes every buffer handed to C with its length so that
/// [`free`] needs only the pointer.
const HEADER: usize = size_of::<usize>();

/// Copies `data` into a new buffer owned by the caller and
/// writes its address and length to `ptr` and `len`.
///
/// Empty data is reported as a null pointer and zero length.
/// The buffer must be released with [`free`].
///
/// # Safety
///
/// - If non-null and aligned, `ptr` and `len` must be valid for
///   writes.
pub(crate) unsafe fn give(data: &[u8], ptr: *mut *mut u8, len: *mut usize) -> Result<()> {
    // SAFETY: See the function's safety docs.
    let (ptr, len) = unsafe { (out(ptr)?, out(len)?) };
    *ptr = ptr::null_mut();
    *len = 0;
    if data.is_empty() {
        return Ok(());
    }
    let total = HEADER
        .checked_add(data.len())
        .ok_or(Error::Crypto(cryptsvc::Error::InvalidLength))?;
    let mut buf = vec![0u8; total].into_boxed_slice();
    let (header, body) = buf.split_at_mut(HEADER);
    header.copy_from_slice(&data.len().to_ne_bytes());
    body.copy_from_slice(data);
    let base = Box::into_raw(buf).cast::<u8>();
    // SAFETY: The allocation is `HEADER + data.len()` bytes
    // long.
    *ptr = unsafe { base.add(HEADER) };
    *len = data.len();
    Ok(())
}

/// Releases a buffer created by [`give`].
///
/// A null `ptr` is ignored.
///
/// # Safety
///
/// - `ptr` must be null or have come from [`give`].
/// - `ptr` must not be used afterward.
pub(crate) unsafe fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: `give` returned `base + HEADER`.
    let base = unsafe { ptr.sub(HEADER) };
    let mut header = [0u8; HEADER];
    // SAFETY: `base` is valid for reads of `HEADER` bytes.
    unsafe { ptr::copy_nonoverlapping(base, header.as_mut_ptr(), HEADER) };
    let total = usize::from_ne_bytes(header).wrapping_add(HEADER);
    // SAFETY: `base` and `total` describe the boxed slice that
    // `give` leaked.
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(base, total)) });
}
