//! X.509 entries.

use alloc::vec::Vec;
use core::{
    ffi::{c_char, c_void},
    ptr,
};

use cryptsvc::{
    Status,
    x509::{self, Certificate, CertificateStack},
};

use crate::{
    buf,
    error::{or_log, to_bool, to_status},
    slot::{Slot, TypeId, Typed},
};

impl Typed for Certificate {
    const TYPE_ID: TypeId = TypeId::new(0x7835_3039);
}

impl Typed for CertificateStack {
    const TYPE_ID: TypeId = TypeId::new(0x7374_6b21);
}

/// One DER certificate in a `ConstructCertificateStack` call.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct CertBlob {
    /// The DER bytes.
    pub data: *const u8,
    /// The length of `data`.
    pub len: usize,
}

/// The X.509 entries.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct X509Entries {
    /// `GetSubjectName(cert, cert_len, buf, *size)`.
    pub get_subject_name: unsafe extern "C" fn(*const u8, usize, *mut u8, *mut usize) -> bool,
    /// `GetCommonName(cert, cert_len, buf, *size)`. The name is
    /// NUL-terminated and `*size` includes the NUL.
    pub get_common_name: unsafe extern "C" fn(*const u8, usize, *mut c_char, *mut usize) -> Status,
    /// `VerifyCert(cert, cert_len, ca, ca_len)`.
    pub verify_cert: unsafe extern "C" fn(*const u8, usize, *const u8, usize) -> bool,
    /// `ConstructCertificate(cert, cert_len, *obj)`.
    pub construct_certificate: unsafe extern "C" fn(*const u8, usize, *mut *mut c_void) -> bool,
    /// `ConstructCertificateStack(*stack, certs, count)`. A null
    /// `*stack` creates a new stack. Otherwise the certificates
    /// are appended to it.
    pub construct_certificate_stack:
        unsafe extern "C" fn(*mut *mut c_void, *const CertBlob, usize) -> bool,
    /// `Free(obj)`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// `StackFree(stack)`.
    pub stack_free: unsafe extern "C" fn(*mut c_void),
    /// `GetTBSCert(cert, cert_len, *tbs, *tbs_len)`. `*tbs` points
    /// into `cert`.
    pub get_tbs_cert: unsafe extern "C" fn(*const u8, usize, *mut *const u8, *mut usize) -> bool,
}

impl X509Entries {
    pub(crate) const fn new() -> Self {
        Self {
            get_subject_name: x509_get_subject_name,
            get_common_name: x509_get_common_name,
            verify_cert: x509_verify_cert,
            construct_certificate: x509_construct_certificate,
            construct_certificate_stack: x509_construct_certificate_stack,
            free: x509_free,
            stack_free: x509_stack_free,
            get_tbs_cert: x509_get_tbs_cert,
        }
    }
}

unsafe extern "C" fn x509_get_subject_name(
    cert: *const u8,
    cert_len: usize,
    out: *mut u8,
    size: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let cert = Certificate::from_der(unsafe { buf::bytes(cert, cert_len)? })?;
        // SAFETY: See the entry's contract.
        unsafe { buf::write_sized(out, size, |out| cert.subject_name(out)) }
    })
}

unsafe extern "C" fn x509_get_common_name(
    cert: *const u8,
    cert_len: usize,
    out: *mut c_char,
    size: *mut usize,
) -> Status {
    to_status(|| {
        // SAFETY: See the entry's contract.
        let cert = Certificate::from_der(unsafe { buf::bytes(cert, cert_len)? })?;
        // SAFETY: See the entry's contract.
        unsafe { buf::write_sized(out.cast(), size, |out| cert.common_name_into(out)) }
    })
}

unsafe extern "C" fn x509_verify_cert(
    cert: *const u8,
    cert_len: usize,
    ca: *const u8,
    ca_len: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (cert, ca) = unsafe { (buf::bytes(cert, cert_len)?, buf::bytes(ca, ca_len)?) };
        x509::verify_cert(cert, ca)?;
        Ok(())
    })
}

unsafe extern "C" fn x509_construct_certificate(
    cert: *const u8,
    cert_len: usize,
    obj: *mut *mut c_void,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let cert = Certificate::from_der(unsafe { buf::bytes(cert, cert_len)? })?;
        // SAFETY: See the entry's contract.
        unsafe { Slot::new_boxed_into(obj, cert) }
    })
}

unsafe extern "C" fn x509_construct_certificate_stack(
    stack: *mut *mut c_void,
    certs: *const CertBlob,
    count: usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let stack = unsafe { buf::out(stack)? };
        // SAFETY: See the entry's contract.
        let blobs = unsafe { buf::items(certs, count)? };
        let ders = blobs
            .iter()
            // SAFETY: Each blob describes `len` readable bytes.
            .map(|blob| unsafe { buf::bytes(blob.data, blob.len) })
            .collect::<Result<Vec<_>, _>>()?;
        if stack.is_null() {
            let mut new = CertificateStack::new();
            new.extend_from_der(ders)?;
            *stack = Slot::new_boxed(new);
        } else {
            // SAFETY: `*stack` came from a previous call.
            let existing = unsafe { Slot::<CertificateStack>::try_from_mut_ptr(*stack)? };
            existing.extend_from_der(ders)?;
        }
        Ok(())
    })
}

unsafe extern "C" fn x509_free(obj: *mut c_void) {
    // SAFETY: `obj` came from `ConstructCertificate`.
    or_log(|| unsafe { Slot::<Certificate>::free(obj) });
}

unsafe extern "C" fn x509_stack_free(stack: *mut c_void) {
    // SAFETY: `stack` came from `ConstructCertificateStack`.
    or_log(|| unsafe { Slot::<CertificateStack>::free(stack) });
}

unsafe extern "C" fn x509_get_tbs_cert(
    cert: *const u8,
    cert_len: usize,
    tbs: *mut *const u8,
    tbs_len: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (tbs, tbs_len) = unsafe { (buf::out(tbs)?, buf::out(tbs_len)?) };
        *tbs = ptr::null();
        *tbs_len = 0;
        // SAFETY: See the entry's contract.
        let raw = x509::raw_tbs_certificate(unsafe { buf::bytes(cert, cert_len)? })?;
        *tbs = raw.as_ptr();
        *tbs_len = raw.len();
        Ok(())
    })
}
