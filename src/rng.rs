//! Pseudo-random source for the collision search.
//!
//! The search only needs a fast, reproducible stream of 32-bit words: the
//! same seed must replay the same candidate states, so every pipeline owns
//! its own [`Lcg`] and passes it down by `&mut`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::bits::mix;

const MULTIPLIER: u32 = 1_103_515_245;
const INCREMENT: u32 = 12_345;

/// Linear-congruential generator `state = 1103515245 * state + 12345 mod 2^32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance the generator and return the new state.
    #[inline(always)]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        self.state
    }

    /// Current state without advancing.
    pub fn state(&self) -> u32 {
        self.state
    }
}

/// A seed derived from the sub-second clock, the wall clock and the process id.
pub fn entropy_seed() -> u32 {
    let (seconds, nanos) = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| (elapsed.as_secs() as u32, elapsed.subsec_nanos()))
        .unwrap_or_default();
    mix(nanos ^ seconds ^ std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_outputs_from_zero() {
        let mut rng = Lcg::new(0);
        assert_eq!(rng.next_u32(), 12345);
        assert_eq!(
            rng.next_u32(),
            12345u32.wrapping_mul(1_103_515_245).wrapping_add(12345)
        );
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut first = Lcg::new(0xdead_beef);
        let mut second = first.clone();
        for _ in 0..1000 {
            assert_eq!(first.next_u32(), second.next_u32());
        }
        assert_eq!(first.state(), second.state());
    }
}
