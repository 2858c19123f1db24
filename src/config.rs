//! Hex command-line values: an optional seed and an optional custom IV.

use crate::error::{CollisionError, CollisionResult};
use crate::md5::ChainingState;
use crate::rng::entropy_seed;

/// Seed and IV given as hex values.
///
/// | values | meaning |
/// |---|---|
/// | 0 | random seed, standard IV |
/// | 1 | seed |
/// | 4 | IV words a, b, c, d |
/// | 5 | seed, then the IV |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HexArgs {
    pub seed: Option<u32>,
    pub iv: Option<ChainingState>,
}

/// Parse one hex word, with or without a `0x` prefix.
pub fn parse_hex_word(value: &str) -> CollisionResult<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() || digits.len() > 8 {
        return Err(CollisionError::InvalidHex(value.to_string()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| CollisionError::InvalidHex(value.to_string()))
}

impl HexArgs {
    pub fn parse<S: AsRef<str>>(values: &[S]) -> CollisionResult<Self> {
        let words = values
            .iter()
            .map(|value| parse_hex_word(value.as_ref()))
            .collect::<CollisionResult<Vec<u32>>>()?;

        match words.as_slice() {
            [] => Ok(Self::default()),
            [seed] => Ok(Self {
                seed: Some(*seed),
                iv: None,
            }),
            [a, b, c, d] => Ok(Self {
                seed: None,
                iv: Some(ChainingState::custom(*a, *b, *c, *d)),
            }),
            [seed, a, b, c, d] => Ok(Self {
                seed: Some(*seed),
                iv: Some(ChainingState::custom(*a, *b, *c, *d)),
            }),
            _ => Err(CollisionError::InvalidArgumentCount(words.len())),
        }
    }

    /// Fill in what was not given: an entropy seed and the standard IV.
    pub fn resolve(self) -> (u32, ChainingState) {
        (
            self.seed.unwrap_or_else(entropy_seed),
            self.iv.unwrap_or(ChainingState::STANDARD),
        )
    }
}
