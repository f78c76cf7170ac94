//! Random Sources
//!
//! Every probabilistic draw in the game (elimination picks, the final coin
//! flip, reward rarity, robbery outcomes) goes through [`RandomSource`].
//!
//! - [`SecureRng`] draws from the operating system CSPRNG and is what the
//!   engine uses in production.
//! - [`SeededRng`] wraps the Xorshift128+ [`DeterministicRng`] so a test can
//!   replay the exact same session from a seed.
//! - [`ScriptedRng`] returns a fixed sequence of draws, used to force a
//!   particular branch (a caught robber, a specific finalist).

use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::Rng;

/// Source of uniform integer draws.
///
/// Implementations must be non-blocking and safe to share between the
/// session scheduler and command handlers.
pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[0, upper)`. Returns 0 when `upper` is 0.
    fn below(&self, upper: u64) -> u64;

    /// Uniform index into a collection of `len` elements.
    fn index(&self, len: usize) -> usize {
        self.below(len as u64) as usize
    }

    /// Uniform draw in `[0, 100)`.
    fn percent(&self) -> u32 {
        self.below(100) as u32
    }

    /// Uniform draw in `[min, max]` (inclusive). Returns `min` if the range is empty.
    fn range_inclusive(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + self.below(max - min + 1)
    }

    /// Unbiased coin flip: 0 or 1.
    fn coin(&self) -> usize {
        self.below(2) as usize
    }
}

/// Fisher-Yates shuffle driven by any random source.
pub fn shuffle<T>(rng: &dyn RandomSource, slice: &mut [T]) {
    for i in (1..slice.len()).rev() {
        let j = rng.index(i + 1);
        slice.swap(i, j);
    }
}

/// Uniformly pick one element.
pub fn choose<'a, T>(rng: &dyn RandomSource, slice: &'a [T]) -> Option<&'a T> {
    if slice.is_empty() {
        None
    } else {
        slice.get(rng.index(slice.len()))
    }
}

// =============================================================================
// SECURE SOURCE
// =============================================================================

/// Cryptographically strong source backed by the OS.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecureRng;

impl RandomSource for SecureRng {
    fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        rand::rngs::OsRng.gen_range(0..upper)
    }
}

// =============================================================================
// DETERMINISTIC SOURCE
// =============================================================================

/// Xorshift128+ generator, seeded through SplitMix64.
///
/// Used only to make randomized tests reproducible; the engine itself draws
/// from [`SecureRng`].
///
/// ```
/// use nameplate::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(7);
/// let mut b = DeterministicRng::new(7);
/// assert_eq!(a.next_below(100), b.next_below(100));
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    s0: u64,
    s1: u64,
}

impl DeterministicRng {
    /// Generator for `seed`.
    pub fn new(seed: u64) -> Self {
        let mut mix = seed;
        let s0 = splitmix64(&mut mix);
        let s1 = splitmix64(&mut mix);
        // all-zero state would stay zero forever
        if s0 | s1 == 0 {
            return Self { s0: 1, s1: 1 };
        }
        Self { s0, s1 }
    }

    /// Next raw 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let (a, mut b) = (self.s0, self.s1);
        let out = a.wrapping_add(b);
        b ^= a;
        self.s0 = a.rotate_left(24) ^ b ^ (b << 16);
        self.s1 = b.rotate_left(37);
        out
    }

    /// Uniform draw in `[0, max)`, rejecting the biased tail.
    pub fn next_below(&mut self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        let limit = u64::MAX - u64::MAX % max;
        loop {
            let v = self.next_u64();
            if v < limit {
                return v % max;
            }
        }
    }
}

fn splitmix64(x: &mut u64) -> u64 {
    *x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Shareable wrapper so a [`DeterministicRng`] can stand in for [`SecureRng`].
#[derive(Debug)]
pub struct SeededRng {
    inner: Mutex<DeterministicRng>,
}

impl SeededRng {
    /// Seeded source.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(DeterministicRng::new(seed)),
        }
    }
}

impl RandomSource for SeededRng {
    fn below(&self, upper: u64) -> u64 {
        self.inner.lock().next_below(upper)
    }
}

// =============================================================================
// SCRIPTED SOURCE
// =============================================================================

/// Replays a fixed list of draws, each reduced modulo the requested bound.
///
/// Once the script runs out every draw returns 0.
#[derive(Debug, Default)]
pub struct ScriptedRng {
    draws: Mutex<VecDeque<u64>>,
}

impl ScriptedRng {
    /// Source that will return `draws` in order.
    pub fn new(draws: impl IntoIterator<Item = u64>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
        }
    }

    /// Append more draws to the script.
    pub fn push(&self, draw: u64) {
        self.draws.lock().push_back(draw);
    }

    /// Draws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.draws.lock().len()
    }
}

impl RandomSource for ScriptedRng {
    fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.draws.lock().pop_front().unwrap_or(0) % upper
    }
}

// =============================================================================
// TESTS
// =============================================================================
