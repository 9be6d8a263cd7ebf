//! Diffie-Hellman entries.

use core::ffi::c_void;

use cryptsvc::pkey::DhContext;
use tracing::debug;

use crate::{
    buf,
    error::{or_log, to_bool},
    random::RNG,
    slot::{Slot, TypeId, Typed},
};

impl Typed for DhContext {
    const TYPE_ID: TypeId = TypeId::new(0x6468_2121);
}

/// The Diffie-Hellman entries.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct DhEntries {
    /// `New()`. Returns an empty heap context.
    pub new: extern "C" fn() -> *mut c_void,
    /// `Free(ctx)`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// `GenerateParameter(ctx, generator, prime_bits, prime)`.
    /// `prime` holds `prime_bits / 8` bytes, rounded up.
    pub generate_parameter: unsafe extern "C" fn(*mut c_void, usize, usize, *mut u8) -> bool,
    /// `SetParameter(ctx, generator, prime_bits, prime)`. `prime`
    /// holds `prime_bits / 8` bytes, rounded up, and must be
    /// exactly `prime_bits` bits long.
    pub set_parameter: unsafe extern "C" fn(*mut c_void, usize, usize, *const u8) -> bool,
    /// `GenerateKey(ctx, public, *size)`.
    pub generate_key: unsafe extern "C" fn(*mut c_void, *mut u8, *mut usize) -> bool,
    /// `ComputeKey(ctx, peer, peer_len, key, *size)`.
    pub compute_key:
        unsafe extern "C" fn(*const c_void, *const u8, usize, *mut u8, *mut usize) -> bool,
}

impl DhEntries {
    pub(crate) const fn new() -> Self {
        Self {
            new: dh_new,
            free: dh_free,
            generate_parameter: dh_generate_parameter,
            set_parameter: dh_set_parameter,
            generate_key: dh_generate_key,
            compute_key: dh_compute_key,
        }
    }
}

extern "C" fn dh_new() -> *mut c_void {
    Slot::new_boxed(DhContext::new())
}

unsafe extern "C" fn dh_free(ctx: *mut c_void) {
    // SAFETY: `ctx` came from `New`.
    or_log(|| unsafe { Slot::<DhContext>::free(ctx) });
}

unsafe extern "C" fn dh_generate_parameter(
    ctx: *mut c_void,
    generator: usize,
    prime_bits: usize,
    prime: *mut u8,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<DhContext>::try_from_mut_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let prime = unsafe { buf::bytes_mut(prime, prime_bits.div_ceil(8))? };
        ctx.generate_parameter(&mut RNG.lock(), generator, prime_bits, prime)?;
        Ok(())
    })
}

unsafe extern "C" fn dh_set_parameter(
    ctx: *mut c_void,
    generator: usize,
    prime_bits: usize,
    prime: *const u8,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<DhContext>::try_from_mut_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let prime = unsafe { buf::bytes(prime, prime_bits.div_ceil(8))? };
        let got = bit_len(prime);
        if got != prime_bits {
            debug!(got, prime_bits, "prime length mismatch");
            return Err(cryptsvc::Error::InvalidArgument("prime length mismatch").into());
        }
        ctx.set_parameter(generator, prime)?;
        Ok(())
    })
}

/// The bit length of the big-endian integer `bytes`.
fn bit_len(bytes: &[u8]) -> usize {
    let mut rest = bytes.iter().skip_while(|&&b| b == 0);
    match rest.next() {
        Some(&top) => {
            let top_bits = u8::BITS.saturating_sub(top.leading_zeros());
            rest.count()
                .saturating_mul(8)
                .saturating_add(top_bits as usize)
        }
        None => 0,
    }
}

unsafe extern "C" fn dh_generate_key(ctx: *mut c_void, public: *mut u8, size: *mut usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<DhContext>::try_from_mut_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        unsafe {
            buf::write_sized(public, size, |out| {
                ctx.generate_key(&mut RNG.lock(), out)
            })
        }
    })
}

unsafe extern "C" fn dh_compute_key(
    ctx: *const c_void,
    peer: *const u8,
    peer_len: usize,
    key: *mut u8,
    size: *mut usize,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<DhContext>::try_from_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let peer = unsafe { buf::bytes(peer, peer_len)? };
        // SAFETY: See the entry's contract.
        unsafe { buf::write_sized(key, size, |out| ctx.compute_key(peer, out)) }
    })
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_bit_len() {
        assert_eq!(bit_len(&[]), 0);
        assert_eq!(bit_len(&[0, 0]), 0);
        assert_eq!(bit_len(&[1]), 1);
        assert_eq!(bit_len(&[0, 0x80]), 8);
        assert_eq!(bit_len(&[0x01, 0x00]), 9);
        assert_eq!(bit_len(&[0, 0xff, 0xff]), 16);
    }

    #[test]
    fn test_set_parameter_checks_prime_bits() {
        RNG.lock().seed(Some(b"dh set parameter".as_slice())).unwrap();
        let e = DhEntries::new();
        let (a, b) = ((e.new)(), (e.new)());
        let mut prime = [0u8; 8];
        unsafe {
            assert!((e.generate_parameter)(a, 2, 64, prime.as_mut_ptr()));
            assert!((e.set_parameter)(b, 2, 64, prime.as_ptr()));
        }

        // The same prime, read under a wider declared length.
        let mut wide = [0u8; 9];
        wide[1..].copy_from_slice(&prime);
        assert!(!unsafe { (e.set_parameter)(b, 2, 72, wide.as_ptr()) });
        assert!(!unsafe { (e.set_parameter)(b, 2, 65, wide.as_ptr()) });

        let mut size = 0;
        assert!(!unsafe { (e.generate_key)(b, core::ptr::null_mut(), &mut size) });
        assert_eq!(size, 8);

        unsafe {
            (e.free)(a);
            (e.free)(b);
        }
    }
}
