//! Deterministic random number generation.
//!
//! RULE: Nothing in the window pipeline may call a platform RNG.
//! All randomness flows through SeededRng instances derived from an
//! explicit seed supplied by the caller.
//!
//! Each consumer gets its own stream, seeded from (seed XOR stream slot).
//! This means:
//!   - Graph sampling and graph layout share one caller seed but never
//!     consume each other's draws.
//!   - Each stream is fully reproducible in isolation.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single consumer.
pub struct SeededRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SeededRng {
    /// Create a stream RNG from a caller seed and a stable stream slot.
    pub fn new(seed: u64, stream: RngStream) -> Self {
        let derived_seed = seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            name: stream.name(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n), without modulo bias. Returns 0 when n == 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.inner.gen_range(0..n)
    }

    /// Roll a u64 in [lo, hi]. Bounds are swapped if inverted.
    pub fn range_inclusive(&mut self, lo: u64, hi: u64) -> u64 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.inner.gen_range(lo..=hi)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick an index according to non-negative weights.
    /// Falls back to the last index when weights sum to zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if weights.is_empty() {
            return 0;
        }
        if total <= 0.0 {
            return weights.len() - 1;
        }
        let mut roll = self.next_f64() * total;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            if roll < *w {
                return i;
            }
            roll -= *w;
        }
        weights.len() - 1
    }

    /// Sixteen random bytes, used to mint v4-format UUIDs reproducibly.
    pub fn next_bytes16(&mut self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.next_u64().to_le_bytes());
        out[8..].copy_from_slice(&self.next_u64().to_le_bytes());
        out
    }

    /// Choose `k` distinct indices from `0..n` uniformly (partial
    /// Fisher-Yates). The result is returned in ascending order.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..n).collect();
        if k >= n {
            return pool;
        }
        for i in 0..k {
            let j = i + self.next_u64_below((n - i) as u64) as usize;
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool.sort_unstable();
        pool
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries: only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngStream {
    Generator = 0,
    GraphSample = 1,
    GraphLayout = 2,
}

impl RngStream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::GraphSample => "graph_sample",
            Self::GraphLayout => "graph_layout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SeededRng::new(7, RngStream::Generator);
        let mut b = SeededRng::new(7, RngStream::Generator);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn streams_are_independent() {
        let mut a = SeededRng::new(7, RngStream::GraphSample);
        let mut b = SeededRng::new(7, RngStream::GraphLayout);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn sample_indices_distinct_and_sorted() {
        let mut rng = SeededRng::new(42, RngStream::GraphSample);
        let picked = rng.sample_indices(100, 10);
        assert_eq!(picked.len(), 10);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert!(picked.iter().all(|i| *i < 100));
    }

    #[test]
    fn sample_indices_returns_everything_when_k_exceeds_n() {
        let mut rng = SeededRng::new(1, RngStream::GraphSample);
        assert_eq!(rng.sample_indices(3, 10), vec![0, 1, 2]);
    }

    #[test]
    fn ranges_cover_their_bounds() {
        let mut rng = SeededRng::new(9, RngStream::Generator);
        assert_eq!(rng.next_u64_below(0), 0);
        assert_eq!(rng.range_inclusive(5, 5), 5);
        let _ = rng.range_inclusive(0, u64::MAX);

        let mut counts = [0usize; 3];
        for _ in 0..30_000 {
            counts[rng.next_u64_below(3) as usize] += 1;
        }
        assert!(counts.iter().all(|c| (9_000..11_000).contains(c)), "{counts:?}");
    }

    #[test]
    fn weighted_index_respects_zero_weights() {
        let mut rng = SeededRng::new(3, RngStream::Generator);
        for _ in 0..100 {
            assert_eq!(rng.weighted_index(&[0.0, 1.0, 0.0]), 1);
        }
    }
}
