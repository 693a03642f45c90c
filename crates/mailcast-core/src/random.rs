//! Seedable random source shared by the workers of one campaign

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Mutex, PoisonError};

/// Uniform selection with replacement over read-only pools.
///
/// A fixed seed makes template, sender and endpoint choices reproducible.
pub struct SharedRng {
    inner: Mutex<StdRng>,
}

impl SharedRng {
    /// Seeded when `seed` is given, from OS entropy otherwise
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self {
                inner: Mutex::new(StdRng::from_entropy()),
            },
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick one item uniformly; `None` for an empty pool
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        let mut rng = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        items.choose(&mut *rng)
    }
}

impl std::fmt::Debug for SharedRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRng").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let pool = ["a", "b", "c", "d", "e"];
        let first = SharedRng::seeded(7);
        let second = SharedRng::seeded(7);

        let a: Vec<&str> = (0..20).map(|_| *first.choose(&pool).unwrap()).collect();
        let b: Vec<&str> = (0..20).map(|_| *second.choose(&pool).unwrap()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_choose_empty_pool() {
        let rng = SharedRng::seeded(1);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
    }

    #[test]
    fn test_selection_covers_pool() {
        let pool = [0usize, 1, 2];
        let rng = SharedRng::seeded(42);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[*rng.choose(&pool).unwrap()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
