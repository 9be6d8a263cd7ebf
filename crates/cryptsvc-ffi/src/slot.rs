//! Typed context storage at the C boundary.

use alloc::boxed::Box;
use core::{
    ffi::c_void,
    fmt,
    mem::{MaybeUninit, size_of},
    ops::{Deref, DerefMut},
    ptr,
};

use cryptsvc::Algorithm;
use tracing::{debug, error};

use crate::error::{Error, InvalidPtr, Result};

/// Implemented by types that can be stored in a [`Slot`].
pub trait Typed {
    /// Uniquely identifies the type.
    const TYPE_ID: TypeId;
}

/// Uniquely identifies types.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// The identifier of a dropped or never initialized slot.
    pub const UNSET: Self = Self(0);

    /// Creates a new type ID.
    ///
    /// It must not be [`UNSET`][Self::UNSET].
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Set after the slot's value is initialized.
const INIT: u32 = 1 << 0;

/// A `T` prefixed with its type identifier and an init flag.
///
/// Contexts handed to C are always slots, so a context of the
/// wrong type, a never initialized buffer, or a freed context is
/// detected (with high probability) instead of being
/// reinterpreted.
#[repr(C)]
pub struct Slot<T: Typed> {
    // Should be `T::TYPE_ID`.
    id: TypeId,
    flags: u32,
    inner: MaybeUninit<T>,
}

impl<T: Typed> Slot<T> {
    /// The number of bytes a caller must provide for a slot.
    pub const SIZE: usize = size_of::<Self>();

    fn new(v: T) -> Self {
        Self {
            id: T::TYPE_ID,
            flags: INIT,
            inner: MaybeUninit::new(v),
        }
    }

    /// Writes an initialized slot to `out`.
    ///
    /// Whatever `out` held before is overwritten without being
    /// dropped.
    pub fn init(out: &mut MaybeUninit<Self>, v: T) {
        out.write(Self::new(v));
    }

    fn is_valid(&self) -> bool {
        self.id == T::TYPE_ID
    }

    fn is_init(&self) -> bool {
        self.flags & INIT != 0
    }

    fn check(&self) -> Result<()> {
        if !self.is_valid() {
            error!(got = %self.id, want = %T::TYPE_ID, "invalid type ID");
            Err(Error::InvalidType)
        } else if !self.is_init() {
            error!(flags = self.flags, "not initialized");
            Err(Error::Uninitialized)
        } else {
            Ok(())
        }
    }

    /// Returns a shared reference from `ptr`.
    ///
    /// # Safety
    ///
    /// - If non-null and aligned, `ptr` must be valid for reads
    ///   of [`SIZE`][Self::SIZE] bytes.
    /// - You must uphold Rust's aliasing rules.
    pub unsafe fn try_from_ptr<'a>(ptr: *const c_void) -> Result<&'a Self> {
        let ptr = check_ptr(ptr.cast::<Self>().cast_mut())?;
        // SAFETY: `ptr` is non-null and aligned. See the
        // function's safety docs for the rest.
        let slot = unsafe { &*ptr };
        slot.check()?;
        Ok(slot)
    }

    /// Returns an exclusive reference from `ptr`.
    ///
    /// # Safety
    ///
    /// - If non-null and aligned, `ptr` must be valid for reads
    ///   and writes of [`SIZE`][Self::SIZE] bytes.
    /// - You must uphold Rust's aliasing rules.
    pub unsafe fn try_from_mut_ptr<'a>(ptr: *mut c_void) -> Result<&'a mut Self> {
        let ptr = check_ptr(ptr.cast::<Self>())?;
        // SAFETY: `ptr` is non-null and aligned. See the
        // function's safety docs for the rest.
        let slot = unsafe { &mut *ptr };
        slot.check()?;
        Ok(slot)
    }

    /// Returns a possibly uninitialized exclusive reference from
    /// `ptr`.
    ///
    /// # Safety
    ///
    /// - If non-null and aligned, `ptr` must be valid for writes
    ///   of [`SIZE`][Self::SIZE] bytes.
    /// - You must uphold Rust's aliasing rules.
    pub unsafe fn try_from_uninit_mut_ptr<'a>(
        ptr: *mut c_void,
    ) -> Result<&'a mut MaybeUninit<Self>> {
        let ptr = check_ptr(ptr.cast::<MaybeUninit<Self>>())?;
        // SAFETY: `ptr` is non-null and aligned, and
        // `MaybeUninit` has no validity requirements.
        Ok(unsafe { &mut *ptr })
    }

    /// Moves `v` into a new heap allocated slot.
    pub fn new_boxed(v: T) -> *mut c_void {
        Box::into_raw(Box::new(Self::new(v))).cast()
    }

    /// Writes a new heap allocated slot holding `v` to `out`.
    ///
    /// # Safety
    ///
    /// - If non-null and aligned, `out` must be valid for
    ///   writes.
    pub unsafe fn new_boxed_into(out: *mut *mut c_void, v: T) -> Result<()> {
        let out = check_ptr(out)?;
        // SAFETY: `out` is non-null and aligned. See the
        // function's safety docs for the rest.
        unsafe { out.write(Self::new_boxed(v)) };
        Ok(())
    }

    /// Frees a slot created by [`new_boxed`][Self::new_boxed].
    ///
    /// A null `ptr` is ignored.
    ///
    /// # Safety
    ///
    /// - `ptr` must be null or have come from
    ///   [`new_boxed`][Self::new_boxed] with the same `T`.
    /// - `ptr` must not be used afterward.
    pub unsafe fn free(ptr: *mut c_void) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        // SAFETY: See the function's safety docs.
        let slot = unsafe { Self::try_from_mut_ptr(ptr)? };
        // SAFETY: `slot` came from `Box::into_raw` and is
        // valid.
        drop(unsafe { Box::from_raw(ptr::from_mut(slot)) });
        Ok(())
    }

    /// Returns the inner `T`.
    pub fn get(&self) -> &T {
        debug_assert!(self.is_valid() && self.is_init());
        // SAFETY: Slots are only reachable through `check`ed
        // references, so `inner` is initialized.
        unsafe { self.inner.assume_init_ref() }
    }

    /// Returns the inner `T`.
    pub fn get_mut(&mut self) -> &mut T {
        debug_assert!(self.is_valid() && self.is_init());
        // SAFETY: Slots are only reachable through `check`ed
        // references, so `inner` is initialized.
        unsafe { self.inner.assume_init_mut() }
    }
}

impl<T: Typed> Drop for Slot<T> {
    fn drop(&mut self) {
        debug!(id = %self.id, "dropping slot");
        if !self.is_valid() || !self.is_init() {
            return;
        }
        self.id = TypeId::UNSET;
        self.flags &= !INIT;
        // SAFETY: The header was correct, so `inner` is
        // initialized. The header is now cleared so it is never
        // dropped twice.
        unsafe { self.inner.assume_init_drop() }
    }
}

impl<T: Typed> Deref for Slot<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<T: Typed> DerefMut for Slot<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.get_mut()
    }
}

/// Returns the caller buffer size for a context of type `T`
/// implementing `alg`, or zero if `alg` is not supported.
pub(crate) fn context_size<T: Typed>(alg: Algorithm) -> usize {
    if cryptsvc::context_size(alg) == 0 {
        0
    } else {
        Slot::<T>::SIZE
    }
}

/// Checks that a context implements the algorithm its entry is
/// for.
pub(crate) fn check_alg<A>(got: A, want: A) -> Result<()>
where
    A: fmt::Debug + PartialEq,
{
    if got == want {
        Ok(())
    } else {
        error!(?got, ?want, "context algorithm mismatch");
        Err(Error::InvalidType)
    }
}

/// Checks that `ptr` is non-null and aligned.
pub(crate) fn check_ptr<T>(ptr: *mut T) -> Result<*mut T, InvalidPtr> {
    if ptr.is_null() {
        Err(InvalidPtr::Null)
    } else if !ptr.is_aligned() {
        Err(InvalidPtr::Unaligned)
    } else {
        Ok(ptr)
    }
}

/// Checks that two context pointers do not refer to the same
/// slot.
pub(crate) fn check_distinct(a: *const c_void, b: *const c_void) -> Result<(), InvalidPtr> {
    if ptr::eq(a, b) {
        Err(InvalidPtr::Overlapping)
    } else {
        Ok(())
    }
}
