//! HMAC entries.

use core::{ffi::c_void, ptr};

use cryptsvc::{HmacContext, MacAlgorithm, StreamingDigest};

use crate::{
    buf,
    error::{or_log, to_bool},
    slot::{Slot, TypeId, Typed, check_alg, check_distinct, context_size},
};

impl Typed for HmacContext {
    const TYPE_ID: TypeId = TypeId::new(0x686d_6163);
}

/// Selects the MAC algorithm behind a set of entries.
pub(crate) trait MacKind {
    const ALG: MacAlgorithm;
}

macro_rules! mac_kinds {
    ($($name:ident),* $(,)?) => {
        $(
            pub(crate) enum $name {}

            impl MacKind for $name {
                const ALG: MacAlgorithm = MacAlgorithm::$name;
            }
        )*
    };
}
mac_kinds!(HmacMd5, HmacSha1, HmacSha256);

/// The entries for one HMAC algorithm.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct HmacEntries {
    /// Returns the size of the caller-allocated context, or zero
    /// if the algorithm is not supported.
    pub get_context_size: extern "C" fn() -> usize,
    /// `New()`. Returns an unkeyed heap context, or null.
    pub new: extern "C" fn() -> *mut c_void,
    /// `Free(ctx)`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// `Init(ctx, key, key_len)`.
    pub init: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> bool,
    /// `Duplicate(ctx, new_ctx)`.
    pub duplicate: unsafe extern "C" fn(*const c_void, *mut c_void) -> bool,
    /// `Update(ctx, data, len)`.
    pub update: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> bool,
    /// `Final(ctx, tag)`.
    pub finalize: unsafe extern "C" fn(*mut c_void, *mut u8) -> bool,
}

impl HmacEntries {
    pub(crate) const fn new<M: MacKind>() -> Self {
        Self {
            get_context_size: get_context_size::<M>,
            new: new::<M>,
            free: free::<M>,
            init: init::<M>,
            duplicate: duplicate::<M>,
            update: update::<M>,
            finalize: finalize::<M>,
        }
    }
}

extern "C" fn get_context_size<M: MacKind>() -> usize {
    context_size::<HmacContext>(M::ALG.into())
}

extern "C" fn new<M: MacKind>() -> *mut c_void {
    match HmacContext::new(M::ALG) {
        Ok(ctx) => Slot::new_boxed(ctx),
        Err(err) => {
            or_log(|| Err(err.into()));
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn free<M: MacKind>(ctx: *mut c_void) {
    // SAFETY: `ctx` came from `new`.
    or_log(|| unsafe { Slot::<HmacContext>::free(ctx) });
}

/// Keys `ctx`, discarding any previous key and state.
unsafe extern "C" fn init<M: MacKind>(ctx: *mut c_void, key: *const u8, key_len: usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let key = unsafe { buf::bytes(key, key_len)? };
        let keyed = HmacContext::with_key(M::ALG, key)?;
        // SAFETY: `ctx` is either `GetContextSize` bytes of
        // caller memory or a slot from `new`. `HmacContext` owns
        // no allocations, so the old value is simply overwritten.
        let out = unsafe { Slot::<HmacContext>::try_from_uninit_mut_ptr(ctx)? };
        Slot::init(out, keyed);
        Ok(())
    })
}

unsafe extern "C" fn duplicate<M: MacKind>(ctx: *const c_void, new_ctx: *mut c_void) -> bool {
    to_bool(|| {
        check_distinct(ctx, new_ctx)?;
        // SAFETY: `ctx` does not alias `new_ctx`.
        let src = unsafe { Slot::<HmacContext>::try_from_ptr(ctx)? };
        check_alg(src.algorithm(), M::ALG)?;
        // SAFETY: See the entry's contract.
        let dst = unsafe { Slot::<HmacContext>::try_from_uninit_mut_ptr(new_ctx)? };
        Slot::init(dst, src.get().clone());
        Ok(())
    })
}

unsafe extern "C" fn update<M: MacKind>(ctx: *mut c_void, data: *const u8, len: usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<HmacContext>::try_from_mut_ptr(ctx)? };
        check_alg(ctx.algorithm(), M::ALG)?;
        // SAFETY: See the entry's contract.
        let data = unsafe { buf::bytes(data, len)? };
        ctx.update(data)?;
        Ok(())
    })
}

unsafe extern "C" fn finalize<M: MacKind>(ctx: *mut c_void, tag: *mut u8) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<HmacContext>::try_from_mut_ptr(ctx)? };
        check_alg(ctx.algorithm(), M::ALG)?;
        // SAFETY: `tag` holds the algorithm's tag size.
        let out = unsafe { buf::bytes_mut(tag, M::ALG.tag_size())? };
        ctx.finalize_into(out)?;
        Ok(())
    })
}
