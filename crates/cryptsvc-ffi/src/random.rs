//! The process-wide CSPRNG.

use cryptsvc::RandomGenerator;
use spin::Mutex;

use crate::{buf, error::to_bool, slot::check_ptr};

/// Drives every entry that needs randomness.
///
/// It starts unseeded, so key and parameter generation fail
/// until `RandomSeed` is called.
pub(crate) static RNG: Mutex<RandomGenerator> = Mutex::new(RandomGenerator::new());

/// The random entries.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct RandomEntries {
    /// `RandomSeed(seed, seed_len)`. A null `seed` draws from the
    /// platform.
    pub seed: unsafe extern "C" fn(*const u8, usize) -> bool,
    /// `RandomBytes(out, len)`.
    pub bytes: unsafe extern "C" fn(*mut u8, usize) -> bool,
}

impl RandomEntries {
    pub(crate) const fn new() -> Self {
        Self {
            seed: random_seed,
            bytes: random_bytes,
        }
    }
}

unsafe extern "C" fn random_seed(seed: *const u8, seed_len: usize) -> bool {
    to_bool(|| {
        // SAFETY: See the entry's contract.
        let seed = unsafe { buf::opt_bytes(seed, seed_len)? };
        RNG.lock().seed(seed)?;
        Ok(())
    })
}

unsafe extern "C" fn random_bytes(out: *mut u8, len: usize) -> bool {
    to_bool(|| {
        check_ptr(out)?;
        // SAFETY: See the entry's contract.
        let out = unsafe { buf::bytes_mut(out, len)? };
        RNG.lock().random_bytes(out)?;
        Ok(())
    })
}
