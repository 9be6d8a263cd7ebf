//! A seedable CSPRNG.

#![forbid(unsafe_code)]

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use sha2::{Digest as _, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Used when no seed is supplied and no OS entropy source is
/// available.
#[cfg_attr(feature = "getrandom", allow(dead_code))]
const DEFAULT_SEED: &[u8] = b"cryptsvc default CSPRNG seed";

/// A deterministic random bit generator.
///
/// The generator is ChaCha20 keyed with the SHA-256 digest of the
/// seed, so two generators seeded identically produce identical
/// output.
pub struct RandomGenerator {
    rng: Option<ChaCha20Rng>,
}

impl RandomGenerator {
    /// Creates an unseeded generator.
    pub const fn new() -> Self {
        Self { rng: None }
    }

    /// Creates a generator seeded with `seed`.
    pub fn with_seed(seed: &[u8]) -> Self {
        let mut rng = Self::new();
        rng.reseed(seed);
        rng
    }

    /// Seeds (or reseeds) the generator.
    ///
    /// With `None` the seed is drawn from the OS when the
    /// `getrandom` feature is enabled and is a fixed default
    /// otherwise.
    pub fn seed(&mut self, seed: Option<&[u8]>) -> Result<()> {
        match seed {
            Some(seed) => self.reseed(seed),
            None => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "getrandom")] {
                        let mut buf = [0u8; 32];
                        getrandom::getrandom(&mut buf).map_err(|err| {
                            tracing::warn!(%err, "unable to read OS entropy");
                            Error::NotSeeded
                        })?;
                        self.reseed(&buf);
                    } else {
                        debug!("using the default seed");
                        self.reseed(DEFAULT_SEED);
                    }
                }
            }
        }
        Ok(())
    }

    fn reseed(&mut self, seed: &[u8]) {
        let key: [u8; 32] = Sha256::digest(seed).into();
        self.rng = Some(ChaCha20Rng::from_seed(key));
    }

    /// Reports whether the generator has been seeded.
    pub const fn is_seeded(&self) -> bool {
        self.rng.is_some()
    }

    /// Fills `out` with random bytes.
    pub fn random_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        self.rng()?.fill_bytes(out);
        Ok(())
    }

    /// Returns the underlying RNG for key generation.
    pub fn rng(&mut self) -> Result<&mut ChaCha20Rng> {
        self.rng.as_mut().ok_or_else(|| {
            debug!("CSPRNG used before seeding");
            Error::NotSeeded
        })
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}
