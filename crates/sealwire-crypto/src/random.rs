//! Randomness used for random-mode nonces and key generation.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sealwire_core::{SealError, SealResult};

/// A producer of random bytes.
pub trait RandomSource {
    fn fill_random(&mut self, dest: &mut [u8]) -> SealResult<()>;
}

impl<R: RngCore + ?Sized> RandomSource for R {
    fn fill_random(&mut self, dest: &mut [u8]) -> SealResult<()> {
        self.try_fill_bytes(dest)
            .map_err(|e| SealError::Random(e.to_string()))
    }
}

/// The operating system CSPRNG.
pub fn os_random() -> OsRng {
    OsRng
}

/// Deterministic generator for tests and benches. Never use for real keys.
pub fn seeded(seed: [u8; 32]) -> StdRng {
    StdRng::from_seed(seed)
}
