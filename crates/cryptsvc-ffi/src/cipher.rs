//! Block and stream cipher entries.

use alloc::vec::Vec;
use core::ffi::c_void;

use cryptsvc::{
    Arc4Context, BlockCipher, BlockCipherContext, CipherAlgorithm, Error as CryptoError,
    StreamCipher,
};

use crate::{
    buf,
    error::{Result, to_bool},
    slot::{Slot, TypeId, Typed, check_alg, context_size},
};

impl Typed for BlockCipherContext {
    const TYPE_ID: TypeId = TypeId::new(0x626c_6b63);
}

impl Typed for Arc4Context {
    const TYPE_ID: TypeId = TypeId::new(0x6172_6334);
}

/// Selects the block cipher behind a set of entries.
pub(crate) trait CipherKind {
    const ALG: CipherAlgorithm;
}

pub(crate) enum Tdes {}

impl CipherKind for Tdes {
    const ALG: CipherAlgorithm = CipherAlgorithm::Tdes;
}

pub(crate) enum Aes {}

impl CipherKind for Aes {
    const ALG: CipherAlgorithm = CipherAlgorithm::Aes;
}

/// The entries for one block cipher.
///
/// Input and output buffers may be the same buffer.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct BlockCipherEntries {
    /// Returns the size of the caller-allocated context, or zero
    /// if the algorithm is not supported.
    pub get_context_size: extern "C" fn() -> usize,
    /// `Init(ctx, key, key_bits)`.
    pub init: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> bool,
    /// `EcbEncrypt(ctx, input, len, output)`.
    pub ecb_encrypt: unsafe extern "C" fn(*const c_void, *const u8, usize, *mut u8) -> bool,
    /// `EcbDecrypt(ctx, input, len, output)`.
    pub ecb_decrypt: unsafe extern "C" fn(*const c_void, *const u8, usize, *mut u8) -> bool,
    /// `CbcEncrypt(ctx, input, len, iv, output)`.
    pub cbc_encrypt:
        unsafe extern "C" fn(*const c_void, *const u8, usize, *const u8, *mut u8) -> bool,
    /// `CbcDecrypt(ctx, input, len, iv, output)`.
    pub cbc_decrypt:
        unsafe extern "C" fn(*const c_void, *const u8, usize, *const u8, *mut u8) -> bool,
}

impl BlockCipherEntries {
    pub(crate) const fn new<C: CipherKind>() -> Self {
        Self {
            get_context_size: block_context_size::<C>,
            init: block_init::<C>,
            ecb_encrypt: ecb::<C, true>,
            ecb_decrypt: ecb::<C, false>,
            cbc_encrypt: cbc::<C, true>,
            cbc_decrypt: cbc::<C, false>,
        }
    }
}

extern "C" fn block_context_size<C: CipherKind>() -> usize {
    context_size::<BlockCipherContext>(C::ALG.into())
}

unsafe extern "C" fn block_init<C: CipherKind>(
    ctx: *mut c_void,
    key: *const u8,
    key_bits: usize,
) -> bool {
    to_bool(|| {
        if !C::ALG.is_valid_key_bits(key_bits) {
            return Err(CryptoError::InvalidKeyLength.into());
        }
        // SAFETY: `key` holds `key_bits` bits.
        let key = unsafe { buf::bytes(key, key_bits / 8)? };
        let keyed = BlockCipherContext::new(C::ALG, key, key_bits)?;
        // SAFETY: The caller provides `GetContextSize` bytes.
        let out = unsafe { Slot::<BlockCipherContext>::try_from_uninit_mut_ptr(ctx)? };
        Slot::init(out, keyed);
        Ok(())
    })
}

/// Returns the context at `ctx` and a copy of the input, so that
/// the output may overlap it.
///
/// # Safety
///
/// - `ctx` must be a context initialized by `Init`.
/// - If `len` is non-zero, `input` must be valid for reads of
///   `len` bytes.
unsafe fn block_args<'a, C: CipherKind>(
    ctx: *const c_void,
    input: *const u8,
    len: usize,
) -> Result<(&'a BlockCipherContext, Vec<u8>)> {
    // SAFETY: See the function's safety docs.
    let ctx = unsafe { Slot::<BlockCipherContext>::try_from_ptr(ctx)? };
    check_alg(ctx.algorithm(), C::ALG)?;
    // SAFETY: See the function's safety docs.
    let input = unsafe { buf::bytes(input, len)? }.to_vec();
    Ok((ctx.get(), input))
}

unsafe extern "C" fn ecb<C: CipherKind, const ENCRYPT: bool>(
    ctx: *const c_void,
    input: *const u8,
    len: usize,
    output: *mut u8,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (ctx, input) = unsafe { block_args::<C>(ctx, input, len)? };
        // SAFETY: `output` holds `len` bytes.
        let output = unsafe { buf::bytes_mut(output, len)? };
        if ENCRYPT {
            ctx.ecb_encrypt(&input, output)?;
        } else {
            ctx.ecb_decrypt(&input, output)?;
        }
        Ok(())
    })
}

unsafe extern "C" fn cbc<C: CipherKind, const ENCRYPT: bool>(
    ctx: *const c_void,
    input: *const u8,
    len: usize,
    iv: *const u8,
    output: *mut u8,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let (ctx, input) = unsafe { block_args::<C>(ctx, input, len)? };
        // SAFETY: `iv` holds one block.
        let iv = unsafe { buf::bytes(iv, C::ALG.block_size())? }.to_vec();
        // SAFETY: `output` holds `len` bytes.
        let output = unsafe { buf::bytes_mut(output, len)? };
        if ENCRYPT {
            ctx.cbc_encrypt(&input, &iv, output)?;
        } else {
            ctx.cbc_decrypt(&input, &iv, output)?;
        }
        Ok(())
    })
}

/// The ARC4 entries.
///
/// Input and output buffers may be the same buffer.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Arc4Entries {
    /// Returns the size of the caller-allocated context, or zero
    /// if ARC4 is not supported.
    pub get_context_size: extern "C" fn() -> usize,
    /// `Init(ctx, key, key_len)`.
    pub init: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> bool,
    /// `Encrypt(ctx, input, len, output)`.
    pub encrypt: unsafe extern "C" fn(*mut c_void, *const u8, usize, *mut u8) -> bool,
    /// `Decrypt(ctx, input, len, output)`.
    pub decrypt: unsafe extern "C" fn(*mut c_void, *const u8, usize, *mut u8) -> bool,
    /// `Reset(ctx)`.
    pub reset: unsafe extern "C" fn(*mut c_void) -> bool,
}

impl Arc4Entries {
    pub(crate) const fn new() -> Self {
        Self {
            get_context_size: arc4_context_size,
            init: arc4_init,
            encrypt: arc4_process,
            decrypt: arc4_process,
            reset: arc4_reset,
        }
    }
}

extern "C" fn arc4_context_size() -> usize {
    context_size::<Arc4Context>(CipherAlgorithm::Arc4.into())
}

unsafe extern "C" fn arc4_init(ctx: *mut c_void, key: *const u8, key_len: usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let key = unsafe { buf::bytes(key, key_len)? };
        let keyed = Arc4Context::new(key)?;
        // SAFETY: The caller provides `GetContextSize` bytes.
        let out = unsafe { Slot::<Arc4Context>::try_from_uninit_mut_ptr(ctx)? };
        Slot::init(out, keyed);
        Ok(())
    })
}

unsafe extern "C" fn arc4_process(
    ctx: *mut c_void,
    input: *const u8,
    len: usize,
    output: *mut u8,
) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<Arc4Context>::try_from_mut_ptr(ctx)? };
        // SAFETY: See the entry's contract.
        let input = unsafe { buf::bytes(input, len)? }.to_vec();
        // SAFETY: `output` holds `len` bytes.
        let output = unsafe { buf::bytes_mut(output, len)? };
        ctx.process(&input, output)?;
        Ok(())
    })
}

unsafe extern "C" fn arc4_reset(ctx: *mut c_void) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let ctx = unsafe { Slot::<Arc4Context>::try_from_mut_ptr(ctx)? };
        ctx.reset();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use core::mem::MaybeUninit;

    use test_log::test;

    use super::*;

    #[test]
    fn test_aes_cbc_in_place() {
        let e = BlockCipherEntries::new::<Aes>();
        let mut ctx = MaybeUninit::<Slot<BlockCipherContext>>::uninit();
        let ctx = ctx.as_mut_ptr().cast::<c_void>();
        let key = [7u8; 32];
        let iv = [9u8; 16];
        let plaintext = [0x5au8; 48];
        let mut data = plaintext;
        unsafe {
            assert!(!(e.init)(ctx, key.as_ptr(), 100));
            assert!((e.init)(ctx, key.as_ptr(), 256));
            assert!((e.cbc_encrypt)(ctx, data.as_ptr(), data.len(), iv.as_ptr(), data.as_mut_ptr()));
        }
        assert_ne!(data, plaintext);
        unsafe {
            assert!((e.cbc_decrypt)(ctx, data.as_ptr(), data.len(), iv.as_ptr(), data.as_mut_ptr()));
        }
        assert_eq!(data, plaintext);

        // Partial blocks are rejected.
        unsafe {
            assert!(!(e.ecb_encrypt)(ctx, data.as_ptr(), 15, data.as_mut_ptr()));
        }
    }

    #[test]
    fn test_tdes_ecb_known_answer() {
        let e = BlockCipherEntries::new::<Tdes>();
        if (e.get_context_size)() == 0 {
            return;
        }
        let mut ctx = MaybeUninit::<Slot<BlockCipherContext>>::uninit();
        let ctx = ctx.as_mut_ptr().cast::<c_void>();
        // K1=K2=K3 degenerates to single DES.
        let key = [0x01u8, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        let pt = *b"Now is t";
        let mut ct = [0u8; 8];
        unsafe {
            assert!((e.init)(ctx, key.as_ptr(), 64));
            assert!((e.ecb_encrypt)(ctx, pt.as_ptr(), 8, ct.as_mut_ptr()));
        }
        assert_eq!(ct, [0x3f, 0xa4, 0x0e, 0x8a, 0x98, 0x4d, 0x48, 0x15]);

        // An AES entry rejects a Triple-DES context.
        let aes = BlockCipherEntries::new::<Aes>();
        assert!(!unsafe { (aes.ecb_encrypt)(ctx, pt.as_ptr(), 8, ct.as_mut_ptr()) });
    }

    #[test]
    fn test_arc4_reset() {
        let e = Arc4Entries::new();
        if (e.get_context_size)() == 0 {
            return;
        }
        let mut ctx = MaybeUninit::<Slot<Arc4Context>>::uninit();
        let ctx = ctx.as_mut_ptr().cast::<c_void>();
        let key = b"Key";
        let long_key = b"Secret";
        unsafe {
            assert!(!(e.init)(ctx, key.as_ptr(), key.len()));
            assert!((e.init)(ctx, long_key.as_ptr(), long_key.len()));
        }
        let mut a = *b"Attack at dawn";
        let mut b = a;
        unsafe {
            assert!((e.encrypt)(ctx, a.as_ptr(), a.len(), a.as_mut_ptr()));
            assert!((e.reset)(ctx));
            assert!((e.encrypt)(ctx, b.as_ptr(), b.len(), b.as_mut_ptr()));
        }
        assert_eq!(a, b);
        unsafe {
            assert!((e.reset)(ctx));
            assert!((e.decrypt)(ctx, a.as_ptr(), a.len(), a.as_mut_ptr()));
        }
        assert_eq!(&a, b"Attack at dawn");
    }
}
