//! RSA entries.

use core::{
    ffi::{c_char, c_void},
    ptr,
};

use cryptsvc::{
    Error as CryptoError,
    pkey::{RsaContext, RsaKeyTag},
    x509::Certificate,
};
use tracing::error;

use crate::{
    buf,
    error::{Result, or_log, to_bool},
    random::RNG,
    slot::{Slot, TypeId, Typed},
};

impl Typed for RsaContext {
    const TYPE_ID: TypeId = TypeId::new(0x7273_6121);
}

/// The RSA entries.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct RsaEntries {
    /// `New()`. Returns an empty heap context.
    pub new: extern "C" fn() -> *mut c_void,
    /// `Free(ctx)`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// `SetKey(ctx, tag, value, len)`. A null `value` clears the
    /// component.
    pub set_key: unsafe extern "C" fn(*mut c_void, u32, *const u8, usize) -> bool,
    /// `GetKey(ctx, tag, buf, *size)`.
    pub get_key: unsafe extern "C" fn(*const c_void, u32, *mut u8, *mut usize) -> bool,
    /// `GenerateKey(ctx, bits, exponent, exponent_len)`. A null
    /// `exponent` selects 65537.
    pub generate_key: unsafe extern "C" fn(*mut c_void, usize, *const u8, usize) -> bool,
    /// `CheckKey(ctx)`.
    pub check_key: unsafe extern "C" fn(*const c_void) -> bool,
    /// `Pkcs1Sign(ctx, hash, hash_len, sig, *sig_size)`.
    pub pkcs1_sign:
        unsafe extern "C" fn(*const c_void, *const u8, usize, *mut u8, *mut usize) -> bool,
    /// `Pkcs1Verify(ctx, hash, hash_len, sig, sig_len)`.
    pub pkcs1_verify:
        unsafe extern "C" fn(*const c_void, *const u8, usize, *const u8, usize) -> bool,
    /// `GetPrivateKeyFromPem(pem, pem_len, password, *ctx)`.
    /// `password` is a NUL-terminated string or null.
    pub get_private_key_from_pem:
        unsafe extern "C" fn(*const u8, usize, *const c_char, *mut *mut c_void) -> bool,
    /// `GetPublicKeyFromX509(cert, cert_len, *ctx)`.
    pub get_public_key_from_x509: unsafe extern "C" fn(*const u8, usize, *mut *mut c_void) -> bool,
}

impl RsaEntries {
    pub(crate) const fn new() -> Self {
        Self {
            new: rsa_new,
            free: rsa_free,
            set_key: rsa_set_key,
            get_key: rsa_get_key,
            generate_key: rsa_generate_key,
            check_key: rsa_check_key,
            pkcs1_sign: rsa_pkcs1_sign,
            pkcs1_verify: rsa_pkcs1_verify,
            get_private_key_from_pem: rsa_get_private_key_from_pem,
            get_public_key_from_x509: rsa_get_public_key_from_x509,
        }
    }
}

fn key_tag(tag: u32) -> Result<RsaKeyTag> {
    RsaKeyTag::from_u32(tag).ok_or_else(|| {
        error!(tag, "unknown RSA key tag");
        CryptoError::InvalidArgument("unknown RSA key tag").into()
    })
}

extern "C" fn rsa_new() -> *mut c_void {
    Slot::new_boxed(RsaContext::new())
}

unsafe extern "C" fn rsa_free(ctx: *mut c_void) {
    // SAFETY: `ctx` came from an RSA constructor.
    or_log(|| unsafe { Slot::<RsaContext>::free(ctx) });
}

unsafe extern "C" fn rsa_set_key(ctx: *mut c_void, tag: u32, value: *const u8, len: usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<RsaContext>::try_from_mut_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let value = unsafe { buf::opt_bytes(value, len)? };
        ctx.set_key(key_tag(tag)?, value);
        Ok(())
    })
}

unsafe extern "C" fn rsa_get_key(
    ctx: *const c_void,
    tag: u32,
    out: *mut u8,
    size: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<RsaContext>::try_from_ptr(ctx)? };
        let tag = key_tag(tag)?;
        // SAFETY: See the entry's contract.
        unsafe { buf::write_sized(out, size, |out| ctx.get_key(tag, out)) }
    })
}

unsafe extern "C" fn rsa_generate_key(
    ctx: *mut c_void,
    bits: usize,
    exponent: *const u8,
    exponent_len: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<RsaContext>::try_from_mut_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let exponent = unsafe { buf::opt_bytes(exponent, exponent_len)? };
        ctx.generate_key(&mut RNG.lock(), bits, exponent)?;
        Ok(())
    })
}

unsafe extern "C" fn rsa_check_key(ctx: *const c_void) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<RsaContext>::try_from_ptr(ctx)? };
        ctx.check_key()?;
        Ok(())
    })
}

unsafe extern "C" fn rsa_pkcs1_sign(
    ctx: *const c_void,
    hash: *const u8,
    hash_len: usize,
    sig: *mut u8,
    sig_size: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<RsaContext>::try_from_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let hash = unsafe { buf::bytes(hash, hash_len)? };
        // SAFETY: See the entry's contract.
        unsafe { buf::write_sized(sig, sig_size, |out| ctx.pkcs1_sign(hash, out)) }
    })
}

unsafe extern "C" fn rsa_pkcs1_verify(
    ctx: *const c_void,
    hash: *const u8,
    hash_len: usize,
    sig: *const u8,
    sig_len: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<RsaContext>::try_from_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let (hash, sig) = unsafe { (buf::bytes(hash, hash_len)?, buf::bytes(sig, sig_len)?) };
        ctx.pkcs1_verify(hash, sig)?;
        Ok(())
    })
}

/// Clears `*out`, then stores the context built by `f` in it.
///
/// # Safety
///
/// - If non-null and aligned, `out` must be valid for writes.
unsafe fn new_into<F>(out: *mut *mut c_void, f: F) -> Result<()>
where
    F: FnOnce() -> Result<RsaContext>,
{
    // SAFETY: See the function's safety docs.
    let out = unsafe { buf::out(out)? };
    *out = ptr::null_mut();
    *out = Slot::new_boxed(f()?);
    Ok(())
}

unsafe extern "C" fn rsa_get_private_key_from_pem(
    pem: *const u8,
    pem_len: usize,
    password: *const c_char,
    ctx: *mut *mut c_void,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        unsafe {
            new_into(ctx, || {
                let pem = buf::bytes(pem, pem_len)?;
                let password = buf::opt_cstr(password);
                Ok(RsaContext::from_private_key_pem(pem, password)?)
            })
        }
    })
}

unsafe extern "C" fn rsa_get_public_key_from_x509(
    cert: *const u8,
    cert_len: usize,
    ctx: *mut *mut c_void,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        unsafe {
            new_into(ctx, || {
                let cert = Certificate::from_der(buf::bytes(cert, cert_len)?)?;
                Ok(RsaContext::from_public_key(&cert.rsa_public_key()?))
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use cryptsvc::{HashAlgorithm, digest, test_util::fixtures};
    use test_log::test;

    use super::*;

    #[test]
    fn test_components_and_signatures() {
        let e = RsaEntries::new();
        let mut key = ptr::null_mut();
        let password = c"password";
        unsafe {
            assert!(!(e.get_private_key_from_pem)(
                fixtures::LEAF_KEY_ENCRYPTED_PEM.as_ptr(),
                fixtures::LEAF_KEY_ENCRYPTED_PEM.len(),
                ptr::null(),
                &mut key,
            ));
            assert!(key.is_null());
            assert!((e.get_private_key_from_pem)(
                fixtures::LEAF_KEY_ENCRYPTED_PEM.as_ptr(),
                fixtures::LEAF_KEY_ENCRYPTED_PEM.len(),
                password.as_ptr(),
                &mut key,
            ));
            assert!((e.check_key)(key));
        }

        // Probe, then fill.
        let mut size = 0;
        assert!(!unsafe { (e.get_key)(key, RsaKeyTag::N as u32, ptr::null_mut(), &mut size) });
        assert_eq!(size, 256);
        let mut n = vec![0u8; size];
        assert!(unsafe { (e.get_key)(key, RsaKeyTag::N as u32, n.as_mut_ptr(), &mut size) });
        assert!(!unsafe { (e.get_key)(key, 99, n.as_mut_ptr(), &mut size) });

        let hash = digest(HashAlgorithm::Sha256, b"message").unwrap();
        let mut sig = [0u8; 256];
        let mut sig_len = sig.len();
        unsafe {
            assert!((e.pkcs1_sign)(key, hash.as_ptr(), hash.len(), sig.as_mut_ptr(), &mut sig_len));
        }
        assert_eq!(sig_len, 256);

        let mut public = ptr::null_mut();
        unsafe {
            assert!((e.get_public_key_from_x509)(
                fixtures::LEAF.as_ptr(),
                fixtures::LEAF.len(),
                &mut public,
            ));
            assert!((e.pkcs1_verify)(public, hash.as_ptr(), hash.len(), sig.as_ptr(), sig_len));
            // A public key alone is not a valid private key.
            assert!(!(e.check_key)(public));
            // Hashes must have a PKCS#1 digest length.
            assert!(!(e.pkcs1_verify)(public, hash.as_ptr(), 31, sig.as_ptr(), sig_len));
        }

        // A context assembled from the public components alone
        // verifies too.
        let fresh = (e.new)();
        let mut exp = [0u8; 8];
        let mut exp_len = exp.len();
        unsafe {
            assert!((e.get_key)(key, RsaKeyTag::E as u32, exp.as_mut_ptr(), &mut exp_len));
            assert!((e.set_key)(fresh, RsaKeyTag::N as u32, n.as_ptr(), n.len()));
            assert!((e.set_key)(fresh, RsaKeyTag::E as u32, exp.as_ptr(), exp_len));
            assert!((e.pkcs1_verify)(fresh, hash.as_ptr(), hash.len(), sig.as_ptr(), sig_len));
            assert!((e.set_key)(fresh, RsaKeyTag::N as u32, ptr::null(), 0));
            assert!(!(e.pkcs1_verify)(fresh, hash.as_ptr(), hash.len(), sig.as_ptr(), sig_len));
        }

        unsafe {
            (e.free)(fresh);
            (e.free)(public);
            (e.free)(key);
        }
    }

    #[test]
    fn test_wrong_context_type() {
        let e = RsaEntries::new();
        let hmac = crate::hmac::HmacEntries::new::<crate::hmac::HmacSha256>();
        let ctx = (hmac.new)();
        assert!(!unsafe { (e.check_key)(ctx) });
        unsafe {
            // Freeing through the wrong family is refused.
            (e.free)(ctx);
            (hmac.free)(ctx);
        }
    }
}
