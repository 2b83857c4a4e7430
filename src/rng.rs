//! Deterministic random number plumbing.
//!
//! Every source of randomness in the partitioner derives from one global
//! seed through a stable SplitMix64 mixer, so a run with a fixed seed and a
//! fixed thread count is reproducible. Worker RNGs are `SmallRng` seeded
//! from `(seed, worker index)`; refinement tie-breaks draw single bits from
//! a cached 64-bit word to keep the hot path cheap.

use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

/// Steele/Vigna SplitMix64 mixer used for deterministic seeding.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Mix a global seed with a worker index into an independent stream seed.
#[inline]
pub fn mix_seed(global_seed: u64, worker_index: usize) -> u64 {
    let x = global_seed
        ^ 0xD6E8_FEB8_6659_FD93u64
        ^ (worker_index as u64).wrapping_mul(0x9E37_79B1_85EB_CA87);
    splitmix64(x)
}

/// Seeded `SmallRng` for a given worker.
pub fn worker_rng(global_seed: u64, worker_index: usize) -> SmallRng {
    SmallRng::seed_from_u64(mix_seed(global_seed, worker_index))
}

/// Fisher-Yates shuffle driven by the supplied RNG.
pub fn permute<T>(slice: &mut [T], rng: &mut SmallRng) {
    if slice.len() < 2 {
        return;
    }
    for i in (1..slice.len()).rev() {
        let j = rng.gen_range(0..=i);
        slice.swap(i, j);
    }
}

/// Single-bit generator backed by a cached 64-bit draw.
///
/// Refinement tie-breaking consumes one bit per tie; refilling from the
/// underlying RNG once every 64 draws keeps it off the profile.
#[derive(Debug, Clone)]
pub struct BitRng {
    rng: SmallRng,
    cache: u64,
    left: u32,
}

impl BitRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            cache: 0,
            left: 0,
        }
    }

    /// Fair coin flip.
    #[inline]
    pub fn bit(&mut self) -> bool {
        if self.left == 0 {
            self.cache = self.rng.next_u64();
            self.left = 64;
        }
        let b = self.cache & 1 == 1;
        self.cache >>= 1;
        self.left -= 1;
        b
    }

    /// Uniform draw in `[0, bound)`.
    #[inline]
    pub fn index(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_seed_separates_workers() {
        let a = mix_seed(42, 0);
        let b = mix_seed(42, 1);
        assert_ne!(a, b);
        assert_eq!(a, mix_seed(42, 0));
    }

    #[test]
    fn permutation_is_reproducible() {
        let mut a: Vec<u32> = (0..100).collect();
        let mut b: Vec<u32> = (0..100).collect();
        permute(&mut a, &mut worker_rng(7, 0));
        permute(&mut b, &mut worker_rng(7, 0));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn bit_rng_is_roughly_fair() {
        let mut rng = BitRng::new(3);
        let ones = (0..10_000).filter(|_| rng.bit()).count();
        assert!((4_000..6_000).contains(&ones), "ones = {ones}");
    }
}
