//! Virtual-time environment.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use ridesync_core::Environment;

#[derive(Debug)]
struct Inner {
    origin: Instant,
    elapsed: Duration,
    rng: ChaCha8Rng,
}

/// Shared virtual clock plus a seeded RNG.
///
/// Clones share state: advancing one advances all.
#[derive(Debug, Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<Inner>>,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with a specific RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        let inner = Inner {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        self.lock().elapsed += by;
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Next random number.
    pub fn random_u64(&self) -> u64 {
        self.lock().rng.r#gen()
    }

    /// Random index below `len`. `len` must be non-zero.
    pub fn random_index(&self, len: usize) -> usize {
        self.lock().rng.gen_range(0..len)
    }

    /// Shuffle in place.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut self.lock().rng);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        let inner = self.lock();
        inner.origin + inner.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let env = SimEnv::new();
        let other = env.clone();
        let start = env.now();
        other.advance(Duration::from_secs(5));
        assert_eq!(env.now() - start, Duration::from_secs(5));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.random_u64(), b.random_u64());

        let mut x = [1, 2, 3, 4, 5, 6];
        let mut y = x;
        a.shuffle(&mut x);
        b.shuffle(&mut y);
        assert_eq!(x, y);
    }
}
