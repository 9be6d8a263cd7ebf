//! PKCS#5, PKCS#7 and Authenticode entries.

use alloc::vec::Vec;
use core::{
    ffi::{c_char, c_void},
    ptr,
};

use cryptsvc::{authenticode, kdf, pkcs7, x509::CertificateStack};

use crate::{
    buf,
    error::{Error, to_bool},
    slot::{check_distinct, check_ptr},
};

/// The PKCS#5 entry.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Pkcs5Entries {
    /// `HashPassword(password, password_len, salt, salt_len,
    /// iterations, digest_size, out, out_len)`.
    pub hash_password: unsafe extern "C" fn(
        *const u8,
        usize,
        *const u8,
        usize,
        usize,
        usize,
        *mut u8,
        usize,
    ) -> bool,
}

impl Pkcs5Entries {
    pub(crate) const fn new() -> Self {
        Self {
            hash_password: pkcs5_hash_password,
        }
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn pkcs5_hash_password(
    password: *const u8,
    password_len: usize,
    salt: *const u8,
    salt_len: usize,
    iterations: usize,
    digest_size: usize,
    out: *mut u8,
    out_len: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (password, salt) =
            unsafe { (buf::bytes(password, password_len)?, buf::bytes(salt, salt_len)?) };
        // SAFETY: See the entry's contract.
        let out = unsafe { buf::bytes_mut(out, out_len)? };
        kdf::pbkdf2(password, salt, iterations, digest_size, out)?;
        Ok(())
    })
}

/// The PKCS#7 entries.
///
/// Every buffer they return is released with `FreeSigners`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Pkcs7Entries {
    /// `GetSigners(p7, p7_len, *certs, *certs_len, *trusted,
    /// *trusted_len)`.
    pub get_signers: unsafe extern "C" fn(
        *const u8,
        usize,
        *mut *mut u8,
        *mut usize,
        *mut *mut u8,
        *mut usize,
    ) -> bool,
    /// `FreeSigners(buf)`.
    pub free_signers: unsafe extern "C" fn(*mut u8),
    /// `GetCertificatesList(p7, p7_len, *chained, *chained_len,
    /// *unchained, *unchained_len)`. An empty list is null.
    pub get_certificates_list: unsafe extern "C" fn(
        *const u8,
        usize,
        *mut *mut u8,
        *mut usize,
        *mut *mut u8,
        *mut usize,
    ) -> bool,
    /// `Sign(key, key_len, password, content, content_len,
    /// signer, others, *signed, *signed_len)`. `signer` is a
    /// certificate object and `others` a certificate stack object
    /// or null.
    ///
    /// Only functional with the `test_util` feature.
    pub sign: unsafe extern "C" fn(
        *const u8,
        usize,
        *const c_char,
        *const u8,
        usize,
        *const c_void,
        *const c_void,
        *mut *mut u8,
        *mut usize,
    ) -> bool,
    /// `Verify(p7, p7_len, trusted, trusted_len, content,
    /// content_len)`. A null `content` uses the attached
    /// content.
    pub verify: unsafe extern "C" fn(*const u8, usize, *const u8, usize, *const u8, usize) -> bool,
    /// `GetAttachedContent(p7, p7_len, *content, *content_len)`.
    pub get_attached_content:
        unsafe extern "C" fn(*const u8, usize, *mut *mut u8, *mut usize) -> bool,
}

impl Pkcs7Entries {
    pub(crate) const fn new() -> Self {
        Self {
            get_signers: pkcs7_get_signers,
            free_signers: pkcs7_free_signers,
            get_certificates_list: pkcs7_get_certificates_list,
            sign: pkcs7_sign,
            verify: pkcs7_verify,
            get_attached_content: pkcs7_get_attached_content,
        }
    }
}

/// Gives two buffers to the caller, or neither.
///
/// # Safety
///
/// See [`buf::give`].
unsafe fn give_pair(
    a: &[u8],
    a_ptr: *mut *mut u8,
    a_len: *mut usize,
    b: &[u8],
    b_ptr: *mut *mut u8,
    b_len: *mut usize,
) -> Result<(), Error> {
    check_ptr(a_ptr)?;
    check_ptr(a_len)?;
    check_ptr(b_ptr)?;
    check_ptr(b_len)?;
    check_distinct(a_ptr.cast_const().cast(), b_ptr.cast_const().cast())?;
    check_distinct(a_len.cast_const().cast(), b_len.cast_const().cast())?;
    // SAFETY: See the function's safety docs.
    unsafe {
        buf::give(a, a_ptr, a_len)?;
        if let Err(err) = buf::give(b, b_ptr, b_len) {
            buf::free(*a_ptr);
            *a_ptr = ptr::null_mut();
            *a_len = 0;
            return Err(err);
        }
    }
    Ok(())
}

unsafe extern "C" fn pkcs7_get_signers(
    p7: *const u8,
    p7_len: usize,
    certs: *mut *mut u8,
    certs_len: *mut usize,
    trusted: *mut *mut u8,
    trusted_len: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (stack, cert) = pkcs7::get_signers(unsafe { buf::bytes(p7, p7_len)? })?;
        // SAFETY: See the entry's contract.
        unsafe {
            give_pair(
                &stack.encode()?,
                certs,
                certs_len,
                cert.as_der(),
                trusted,
                trusted_len,
            )
        }
    })
}

unsafe extern "C" fn pkcs7_free_signers(ptr: *mut u8) {
    // SAFETY: `ptr` came from a PKCS#7 entry.
    unsafe { buf::free(ptr) }
}

unsafe extern "C" fn pkcs7_get_certificates_list(
    p7: *const u8,
    p7_len: usize,
    chained: *mut *mut u8,
    chained_len: *mut usize,
    unchained: *mut *mut u8,
    unchained_len: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (a, b) = pkcs7::get_certificates_list(unsafe { buf::bytes(p7, p7_len)? })?;
        let encode = |stack: &CertificateStack| {
            if stack.is_empty() {
                Ok(Vec::new())
            } else {
                stack.encode()
            }
        };
        // SAFETY: See the entry's contract.
        unsafe {
            give_pair(
                &encode(&a)?,
                chained,
                chained_len,
                &encode(&b)?,
                unchained,
                unchained_len,
            )
        }
    })
}

#[cfg(any(test, feature = "test_util"))]
#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn pkcs7_sign(
    key: *const u8,
    key_len: usize,
    password: *const c_char,
    content: *const u8,
    content_len: usize,
    signer: *const c_void,
    others: *const c_void,
    signed: *mut *mut u8,
    signed_len: *mut usize,
) -> bool {
    use cryptsvc::x509::Certificate;

    use crate::slot::Slot;

    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (key, content) =
            unsafe { (buf::bytes(key, key_len)?, buf::bytes(content, content_len)?) };
        // SAFETY: See the entry's contract.
        let password = unsafe { buf::opt_cstr(password) };
        // SAFETY: See the entry's contract.
        let signer = unsafe { Slot::<Certificate>::try_from_ptr(signer)? };
        let others = if others.is_null() {
            None
        } else {
            // SAFETY: See the entry's contract.
            Some(unsafe { Slot::<CertificateStack>::try_from_ptr(others)? }.get())
        };
        let p7 = pkcs7::sign(key, password, content, signer, others)?;
        // SAFETY: See the entry's contract.
        unsafe { buf::give(&p7, signed, signed_len) }
    })
}

#[cfg(not(any(test, feature = "test_util")))]
#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn pkcs7_sign(
    _key: *const u8,
    _key_len: usize,
    _password: *const c_char,
    _content: *const u8,
    _content_len: usize,
    _signer: *const c_void,
    _others: *const c_void,
    _signed: *mut *mut u8,
    _signed_len: *mut usize,
) -> bool {
    tracing::warn!("PKCS#7 signing is not available in this build");
    false
}

unsafe extern "C" fn pkcs7_verify(
    p7: *const u8,
    p7_len: usize,
    trusted: *const u8,
    trusted_len: usize,
    content: *const u8,
    content_len: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (p7, trusted, content) = unsafe {
            (
                buf::bytes(p7, p7_len)?,
                buf::bytes(trusted, trusted_len)?,
                buf::opt_bytes(content, content_len)?,
            )
        };
        pkcs7::verify(p7, trusted, content)?;
        Ok(())
    })
}

unsafe extern "C" fn pkcs7_get_attached_content(
    p7: *const u8,
    p7_len: usize,
    content: *mut *mut u8,
    content_len: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let attached = pkcs7::get_attached_content(unsafe { buf::bytes(p7, p7_len)? })?
            .ok_or(cryptsvc::Error::NotFound)?;
        // SAFETY: See the entry's contract.
        unsafe { buf::give(&attached, content, content_len) }
    })
}

/// A UEFI `EFI_TIME`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EfiTime {
    /// 1900 through 9999.
    pub year: u16,
    /// 1 through 12.
    pub month: u8,
    /// 1 through 31.
    pub day: u8,
    /// 0 through 23.
    pub hour: u8,
    /// 0 through 59.
    pub minute: u8,
    /// 0 through 59.
    pub second: u8,
    /// Padding.
    pub pad1: u8,
    /// Always zero.
    pub nanosecond: u32,
    /// Always zero (UTC).
    pub time_zone: i16,
    /// Always zero.
    pub daylight: u8,
    /// Padding.
    pub pad2: u8,
}

impl From<authenticode::Timestamp> for EfiTime {
    fn from(t: authenticode::Timestamp) -> Self {
        Self {
            year: t.year,
            month: t.month,
            day: t.day,
            hour: t.hour,
            minute: t.minute,
            second: t.second,
            ..Self::default()
        }
    }
}

/// The Authenticode entries.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct AuthenticodeEntries {
    /// `AuthenticodeVerify(auth, auth_len, trusted, trusted_len,
    /// image_hash, hash_len)`.
    pub verify: unsafe extern "C" fn(*const u8, usize, *const u8, usize, *const u8, usize) -> bool,
    /// `ImageTimestampVerify(auth, auth_len, tsa, tsa_len,
    /// *signing_time)`.
    pub image_timestamp_verify:
        unsafe extern "C" fn(*const u8, usize, *const u8, usize, *mut EfiTime) -> bool,
}

impl AuthenticodeEntries {
    pub(crate) const fn new() -> Self {
        Self {
            verify: authenticode_verify,
            image_timestamp_verify,
        }
    }
}

unsafe extern "C" fn authenticode_verify(
    auth: *const u8,
    auth_len: usize,
    trusted: *const u8,
    trusted_len: usize,
    image_hash: *const u8,
    hash_len: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (auth, trusted, image_hash) = unsafe {
            (
                buf::bytes(auth, auth_len)?,
                buf::bytes(trusted, trusted_len)?,
                buf::bytes(image_hash, hash_len)?,
            )
        };
        authenticode::authenticode_verify(auth, trusted, image_hash)?;
        Ok(())
    })
}

unsafe extern "C" fn image_timestamp_verify(
    auth: *const u8,
    auth_len: usize,
    tsa: *const u8,
    tsa_len: usize,
    signing_time: *mut EfiTime,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (auth, tsa, out) = unsafe {
            (
                buf::bytes(auth, auth_len)?,
                buf::bytes(tsa, tsa_len)?,
                buf::out(signing_time)?,
            )
        };
        *out = authenticode::image_timestamp_verify(auth, tsa)?.into();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use core::{ptr, slice};

    use cryptsvc::{
        test_util::fixtures,
        x509::{Certificate, CertificateStack},
    };
    use test_log::test;

    use super::*;
    use crate::slot::Slot;

    unsafe fn take(ptr: *mut u8, len: usize) -> Vec<u8> {
        let v = unsafe { slice::from_raw_parts(ptr, len) }.to_vec();
        unsafe { pkcs7_free_signers(ptr) };
        v
    }

    #[test]
    fn test_get_signers_and_free() {
        let e = Pkcs7Entries::new();
        let (mut certs, mut certs_len) = (ptr::null_mut(), 0);
        let (mut trusted, mut trusted_len) = (ptr::null_mut(), 0);
        assert!(unsafe {
            (e.get_signers)(
                fixtures::P7_ATTACHED.as_ptr(),
                fixtures::P7_ATTACHED.len(),
                &mut certs,
                &mut certs_len,
                &mut trusted,
                &mut trusted_len,
            )
        });
        let stack = CertificateStack::decode(&unsafe { take(certs, certs_len) }).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(unsafe { take(trusted, trusted_len) }, fixtures::ROOT);

        // Malformed input fails without handing out buffers.
        assert!(!unsafe {
            (e.get_signers)(
                b"junk".as_ptr(),
                4,
                &mut certs,
                &mut certs_len,
                &mut trusted,
                &mut trusted_len,
            )
        });
    }

    #[test]
    fn test_certificates_list_empty_is_null() {
        let e = Pkcs7Entries::new();
        let (mut a, mut a_len) = (ptr::null_mut(), 0);
        let (mut b, mut b_len) = (ptr::null_mut(), 0);
        assert!(unsafe {
            (e.get_certificates_list)(
                fixtures::P7_ATTACHED.as_ptr(),
                fixtures::P7_ATTACHED.len(),
                &mut a,
                &mut a_len,
                &mut b,
                &mut b_len,
            )
        });
        assert!(a_len > 0);
        assert!(b.is_null());
        assert_eq!(b_len, 0);
        unsafe {
            (e.free_signers)(a);
            (e.free_signers)(b);
        }
    }

    #[test]
    fn test_give_pair_all_or_nothing() {
        let (mut a, mut a_len) = (ptr::null_mut(), 0);
        let (mut b, mut b_len) = (ptr::null_mut(), 0);
        unsafe { give_pair(b"first", &mut a, &mut a_len, b"second", &mut b, &mut b_len) }
            .unwrap();
        assert_eq!(unsafe { take(a, a_len) }, b"first");
        assert_eq!(unsafe { take(b, b_len) }, b"second");

        // Both outputs in one place would lose the first buffer.
        let (mut out, mut out_len) = (ptr::null_mut::<u8>(), 0usize);
        let (out_ptr, len_ptr) = (&raw mut out, &raw mut out_len);
        let err = unsafe { give_pair(b"first", out_ptr, len_ptr, b"second", out_ptr, len_ptr) };
        assert!(matches!(err, Err(Error::InvalidPtr(_))));
        assert!(out.is_null());
        assert_eq!(out_len, 0);

        let (mut a, mut a_len) = (ptr::null_mut(), 0);
        let err = unsafe {
            give_pair(b"first", &mut a, &mut a_len, b"second", ptr::null_mut(), &mut b_len)
        };
        assert!(err.is_err());
        assert!(a.is_null());
        assert_eq!(a_len, 0);
    }

    #[test]
    fn test_verify_and_attached_content() {
        let e = Pkcs7Entries::new();
        let p7 = fixtures::P7_DETACHED;
        let content = fixtures::CONTENT;
        unsafe {
            assert!((e.verify)(
                p7.as_ptr(),
                p7.len(),
                fixtures::INTER.as_ptr(),
                fixtures::INTER.len(),
                content.as_ptr(),
                content.len(),
            ));
            // Detached signatures need the content.
            assert!(!(e.verify)(
                p7.as_ptr(),
                p7.len(),
                fixtures::INTER.as_ptr(),
                fixtures::INTER.len(),
                ptr::null(),
                0,
            ));
        }

        let (mut out, mut out_len) = (ptr::null_mut(), 0);
        assert!(!unsafe { (e.get_attached_content)(p7.as_ptr(), p7.len(), &mut out, &mut out_len) });
        assert!(unsafe {
            (e.get_attached_content)(
                fixtures::P7_ATTACHED.as_ptr(),
                fixtures::P7_ATTACHED.len(),
                &mut out,
                &mut out_len,
            )
        });
        let attached = unsafe { take(out, out_len) };
        assert!(unsafe {
            (e.verify)(
                fixtures::P7_ATTACHED.as_ptr(),
                fixtures::P7_ATTACHED.len(),
                fixtures::ROOT.as_ptr(),
                fixtures::ROOT.len(),
                attached.as_ptr(),
                attached.len(),
            )
        });
    }

    #[test]
    fn test_sign_round_trip() {
        let e = Pkcs7Entries::new();
        let signer = Slot::new_boxed(Certificate::from_der(fixtures::LEAF).unwrap());
        let content = b"capsule";
        let (mut p7, mut p7_len) = (ptr::null_mut(), 0);
        assert!(unsafe {
            (e.sign)(
                fixtures::LEAF_KEY_PEM.as_ptr(),
                fixtures::LEAF_KEY_PEM.len(),
                ptr::null(),
                content.as_ptr(),
                content.len(),
                signer,
                ptr::null(),
                &mut p7,
                &mut p7_len,
            )
        });
        let p7 = unsafe { take(p7, p7_len) };
        assert!(unsafe {
            (e.verify)(
                p7.as_ptr(),
                p7.len(),
                fixtures::LEAF.as_ptr(),
                fixtures::LEAF.len(),
                content.as_ptr(),
                content.len(),
            )
        });
        unsafe { Slot::<Certificate>::free(signer) }.unwrap();
    }

    #[test]
    fn test_hash_password() {
        let e = Pkcs5Entries::new();
        // RFC 6070, two iterations.
        let mut out = [0u8; 20];
        assert!(unsafe {
            (e.hash_password)(b"password".as_ptr(), 8, b"salt".as_ptr(), 4, 2, 20, out.as_mut_ptr(), 20)
        });
        assert_eq!(
            out,
            [
                0xea, 0x6c, 0x01, 0x4d, 0xc7, 0x2d, 0x6f, 0x8c, 0xcd, 0x1e, 0xd9, 0x2a, 0xce, 0x1d,
                0x41, 0xf0, 0xd8, 0xde, 0x89, 0x57,
            ]
        );
        assert!(!unsafe {
            (e.hash_password)(b"password".as_ptr(), 8, b"salt".as_ptr(), 4, 2, 48, out.as_mut_ptr(), 20)
        });
    }

    #[test]
    fn test_authenticode_entries() {
        let e = AuthenticodeEntries::new();
        assert!(unsafe {
            (e.verify)(
                fixtures::AUTHENTICODE.as_ptr(),
                fixtures::AUTHENTICODE.len(),
                fixtures::ROOT.as_ptr(),
                fixtures::ROOT.len(),
                fixtures::IMAGE_HASH.as_ptr(),
                fixtures::IMAGE_HASH.len(),
            )
        });
        let mut time = EfiTime::default();
        assert!(unsafe {
            (e.image_timestamp_verify)(
                fixtures::AUTHENTICODE.as_ptr(),
                fixtures::AUTHENTICODE.len(),
                fixtures::TSA.as_ptr(),
                fixtures::TSA.len(),
                &mut time,
            )
        });
        assert_eq!(
            (time.year, time.month, time.day, time.hour, time.minute, time.second),
            (2024, 3, 15, 12, 30, 45)
        );
    }
}
