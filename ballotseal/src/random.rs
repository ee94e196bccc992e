use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// A cryptographically secure random source that may be shared between
/// threads.
pub trait SecureRandom: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> SecureRandom for T {}

/// The random source handed to the decrypter and its workers. A mutex
/// serializes access because the producer and the encrypt helper draw from
/// it concurrently.
pub type SharedRandom = Arc<Mutex<dyn SecureRandom>>;

/// The operating system CSPRNG. This is the source used in production.
pub fn os_random() -> SharedRandom {
    Arc::new(Mutex::new(OsRng))
}

/// A deterministic source for tests. Two sources built from the same seed
/// produce the same byte stream.
pub fn seeded_random(seed: [u8; 32]) -> SharedRandom {
    Arc::new(Mutex::new(ChaCha20Rng::from_seed(seed)))
}

/// Uniform index in `[0, n)`.
///
/// Sampling goes through `Uniform`, which draws fresh values until one
/// falls inside the unbiased zone instead of reducing modulo `n`.
pub(crate) fn random_index<R: RngCore + ?Sized>(rng: &mut R, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    rng.gen_range(0, n)
}
