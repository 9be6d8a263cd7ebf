//! Digest entries.

use core::ffi::c_void;

use cryptsvc::{HashAlgorithm, HashContext, StreamingDigest, hash_all};

use crate::{
    buf,
    error::to_bool,
    slot::{Slot, TypeId, Typed, check_alg, check_distinct, context_size},
};

impl Typed for HashContext {
    const TYPE_ID: TypeId = TypeId::new(0x6861_7368);
}

/// Selects the hash algorithm behind a set of entries.
pub(crate) trait HashKind {
    const ALG: HashAlgorithm;
}

macro_rules! hash_kinds {
    ($($name:ident),* $(,)?) => {
        $(
            pub(crate) enum $name {}

            impl HashKind for $name {
                const ALG: HashAlgorithm = HashAlgorithm::$name;
            }
        )*
    };
}
hash_kinds!(Md4, Md5, Sha1, Sha256, Sha384, Sha512);

/// The entries for one hash algorithm.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct HashEntries {
    /// Returns the size of the caller-allocated context, or zero
    /// if the algorithm is not supported.
    pub get_context_size: extern "C" fn() -> usize,
    /// `Init(ctx)`.
    pub init: unsafe extern "C" fn(*mut c_void) -> bool,
    /// `Duplicate(ctx, new_ctx)`.
    pub duplicate: unsafe extern "C" fn(*const c_void, *mut c_void) -> bool,
    /// `Update(ctx, data, len)`.
    pub update: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> bool,
    /// `Final(ctx, digest)`.
    pub finalize: unsafe extern "C" fn(*mut c_void, *mut u8) -> bool,
    /// `HashAll(data, len, digest)`.
    pub hash_all: unsafe extern "C" fn(*const u8, usize, *mut u8) -> bool,
}

impl HashEntries {
    pub(crate) const fn new<H: HashKind>() -> Self {
        Self {
            get_context_size: get_context_size::<H>,
            init: init::<H>,
            duplicate: duplicate::<H>,
            update: update::<H>,
            finalize: finalize::<H>,
            hash_all: hash_all_entry::<H>,
        }
    }
}

extern "C" fn get_context_size<H: HashKind>() -> usize {
    context_size::<HashContext>(H::ALG.into())
}

unsafe extern "C" fn init<H: HashKind>(ctx: *mut c_void) -> bool {
    to_bool(|| {
        // SAFETY: The caller provides `GetContextSize` bytes.
        let out = unsafe { Slot::<HashContext>::try_from_uninit_mut_ptr(ctx)? };
        Slot::init(out, HashContext::new(H::ALG)?);
        Ok(())
    })
}

unsafe extern "C" fn duplicate<H: HashKind>(ctx: *const c_void, new_ctx: *mut c_void) -> bool {
    to_bool(|| {
        check_distinct(ctx, new_ctx)?;
        // SAFETY: `ctx` was initialized by `init` and does not
        // alias `new_ctx`.
        let src = unsafe { Slot::<HashContext>::try_from_ptr(ctx)? };
        check_alg(src.algorithm(), H::ALG)?;
        // SAFETY: The caller provides `GetContextSize` bytes.
        let dst = unsafe { Slot::<HashContext>::try_from_uninit_mut_ptr(new_ctx)? };
        Slot::init(dst, src.get().clone());
        Ok(())
    })
}

unsafe extern "C" fn update<H: HashKind>(ctx: *mut c_void, data: *const u8, len: usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<HashContext>::try_from_mut_ptr(ctx)? };
        check_alg(ctx.algorithm(), H::ALG)?;
        // SAFETY: See the entry's contract.
        let data = unsafe { buf::bytes(data, len)? };
        ctx.update(data)?;
        Ok(())
    })
}

unsafe extern "C" fn finalize<H: HashKind>(ctx: *mut c_void, digest: *mut u8) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<HashContext>::try_from_mut_ptr(ctx)? };
        check_alg(ctx.algorithm(), H::ALG)?;
        // SAFETY: `digest` holds the algorithm's digest size.
        let out = unsafe { buf::bytes_mut(digest, H::ALG.digest_size())? };
        ctx.finalize_into(out)?;
        Ok(())
    })
}

unsafe extern "C" fn hash_all_entry<H: HashKind>(
    data: *const u8,
    len: usize,
    digest: *mut u8,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let data = unsafe { buf::bytes(data, len)? };
        // SAFETY: `digest` holds the algorithm's digest size.
        let out = unsafe { buf::bytes_mut(digest, H::ALG.digest_size())? };
        hash_all(H::ALG, data, out)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use core::{mem::MaybeUninit, ptr};

    use cryptsvc::digest;
    use test_log::test;

    use super::*;

    type Buf = MaybeUninit<Slot<HashContext>>;

    #[test]
    fn test_streaming_matches_one_shot() {
        let e = HashEntries::new::<Sha256>();
        assert_eq!((e.get_context_size)(), Slot::<HashContext>::SIZE);

        let mut ctx = Buf::uninit();
        let ctx = ctx.as_mut_ptr().cast::<c_void>();
        let mut copy = Buf::uninit();
        let copy = copy.as_mut_ptr().cast::<c_void>();
        unsafe {
            assert!((e.init)(ctx));
            assert!((e.update)(ctx, b"ab".as_ptr(), 2));
            assert!((e.duplicate)(ctx, copy));
            assert!((e.update)(ctx, ptr::null(), 0));
            assert!((e.update)(ctx, b"c".as_ptr(), 1));
            assert!((e.update)(copy, b"c".as_ptr(), 1));
        }

        let want = digest(HashAlgorithm::Sha256, b"abc").unwrap();
        let (mut a, mut b, mut c) = ([0u8; 32], [0u8; 32], [0u8; 32]);
        unsafe {
            assert!((e.finalize)(ctx, a.as_mut_ptr()));
            assert!((e.finalize)(copy, b.as_mut_ptr()));
            assert!((e.hash_all)(b"abc".as_ptr(), 3, c.as_mut_ptr()));
        }
        assert_eq!(a[..], want[..]);
        assert_eq!(b[..], want[..]);
        assert_eq!(c[..], want[..]);

        // A finalized context is unusable until the next `Init`.
        unsafe {
            assert!(!(e.update)(ctx, b"d".as_ptr(), 1));
            assert!(!(e.finalize)(ctx, a.as_mut_ptr()));
            assert!((e.init)(ctx));
            assert!((e.finalize)(ctx, a.as_mut_ptr()));
        }
        assert_eq!(a[..], digest(HashAlgorithm::Sha256, b"").unwrap()[..]);
    }

    #[test]
    fn test_rejects_wrong_context() {
        let sha1 = HashEntries::new::<Sha1>();
        let sha512 = HashEntries::new::<Sha512>();
        let mut ctx = Buf::uninit();
        let ctx = ctx.as_mut_ptr().cast::<c_void>();
        let mut out = [0u8; 64];
        unsafe {
            assert!((sha1.init)(ctx));
            assert!(!(sha512.update)(ctx, b"x".as_ptr(), 1));
            assert!(!(sha512.finalize)(ctx, out.as_mut_ptr()));
            assert!(!(sha1.duplicate)(ctx, ctx));
            assert!(!(sha1.init)(ptr::null_mut()));
            assert!(!(sha1.update)(ctx, ptr::null(), 1));
        }
    }
}
