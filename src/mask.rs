//! Mask tables enumerating every subset of a fixed set of bit positions.
//!
//! A tunnel flips a chosen group of bits in one state word. Walking the
//! table visits every combination of those bits exactly once, starting with
//! the empty mask so the unmodified state is always tried first.

use crate::bits::mask_bit;
use crate::error::{CollisionError, CollisionResult};

/// All `2^strength` masks over an ordered list of 1-based bit positions.
///
/// Entry `i` has bit `positions[j]` set exactly when bit `j` of `i` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskTable {
    positions: Vec<u32>,
    entries: Vec<u32>,
}

impl MaskTable {
    /// Build the table for `positions`.
    ///
    /// Fails with [`CollisionError::InvalidMaskParameters`] when there are 32
    /// or more positions, or when a position is outside `1..=32` or repeated.
    pub fn generate(positions: &[u32]) -> CollisionResult<Self> {
        let strength = positions.len();
        if strength >= 32 {
            return Err(CollisionError::InvalidMaskParameters {
                strength,
                detail: "tunnels of 32 or more bits cover the whole word".to_string(),
            });
        }

        let mut seen = 0u32;
        for &position in positions {
            let single = mask_bit(position);
            if single == 0 {
                return Err(CollisionError::InvalidMaskParameters {
                    strength,
                    detail: format!("bit position {} is outside 1..=32", position),
                });
            }
            if seen & single != 0 {
                return Err(CollisionError::InvalidMaskParameters {
                    strength,
                    detail: format!("bit position {} is repeated", position),
                });
            }
            seen |= single;
        }

        let entries = (0u32..1 << strength)
            .map(|index| {
                positions
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| (index >> j) & 1 == 1)
                    .fold(0u32, |mask, (_, &position)| mask ^ mask_bit(position))
            })
            .collect();

        Ok(Self {
            positions: positions.to_vec(),
            entries,
        })
    }

    /// Number of bit positions.
    pub fn strength(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// All masks in index order.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Union of every bit the table can flip.
    pub fn span(&self) -> u32 {
        self.positions.iter().fold(0, |acc, &p| acc | mask_bit(p))
    }

    /// Masks a tunnel walks: the full table when enabled, only the empty
    /// mask when disabled.
    pub fn domain(&self, enabled: bool) -> &[u32] {
        if enabled {
            &self.entries
        } else {
            &self.entries[..1]
        }
    }
}
