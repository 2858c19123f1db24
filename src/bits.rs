//! 32-bit word helpers shared by the step equations and the condition checks.
//!
//! Bit positions are 1-based throughout the crate: position 1 is the least
//! significant bit and position 32 the sign bit, matching the way sufficient
//! conditions are written for the MD5 differential path.

/// Sign bit of a 32-bit word, bit position 32.
pub const SIGN_BIT: u32 = 0x8000_0000;

/// Bit at 1-based `position` of `value`, as 0 or 1.
///
/// Positions outside `1..=32` read as 0.
#[inline(always)]
pub fn bit(value: u32, position: u32) -> u32 {
    if position == 0 || position > 32 {
        0
    } else {
        (value >> (position - 1)) & 1
    }
}

/// Single-bit mask for 1-based `position`, 0 outside `1..=32`.
#[inline(always)]
pub const fn mask_bit(position: u32) -> u32 {
    if position == 0 || position > 32 {
        0
    } else {
        1 << (position - 1)
    }
}

#[inline(always)]
pub fn rotate_left(value: u32, shift: u32) -> u32 {
    value.rotate_left(shift)
}

#[inline(always)]
pub fn rotate_right(value: u32, shift: u32) -> u32 {
    value.rotate_right(shift)
}

/// Robert Jenkins' 32-bit integer hash, used to spread weak entropy into a seed.
pub fn mix(seed: u32) -> u32 {
    let mut a = seed;
    a = a.wrapping_add(0x7ed5_5d16).wrapping_add(a << 12);
    a = (a ^ 0xc761_c23c) ^ (a >> 19);
    a = a.wrapping_add(0x1656_67b1).wrapping_add(a << 5);
    a = a.wrapping_add(0xd3a2_646c) ^ (a << 9);
    a = a.wrapping_add(0xfd70_46c5).wrapping_add(a << 3);
    a = (a ^ 0xb55a_4f09) ^ (a >> 16);
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_boundaries() {
        assert_eq!(bit(0xffff_ffff, 0), 0);
        assert_eq!(bit(0xffff_ffff, 33), 0);
        assert_eq!(bit(0x8000_0000, 32), 1);
        assert_eq!(bit(0x0000_0001, 1), 1);
        assert_eq!(bit(0x0000_0001, 2), 0);
    }

    #[test]
    fn test_bit_matches_mask_bit() {
        let value = 0xa5c3_0f96;
        for position in 1..=32 {
            let expected = u32::from(value & mask_bit(position) != 0);
            assert_eq!(bit(value, position), expected, "position {}", position);
        }
        assert_eq!(mask_bit(0), 0);
        assert_eq!(mask_bit(33), 0);
        assert_eq!(mask_bit(32), SIGN_BIT);
    }

    #[test]
    fn test_rotations_are_inverse() {
        for shift in 0..32 {
            let value = 0x1234_5678;
            assert_eq!(rotate_right(rotate_left(value, shift), shift), value);
        }
        assert_eq!(rotate_left(0x8000_0001, 1), 0x0000_0003);
        assert_eq!(rotate_right(0x0000_0003, 1), 0x8000_0001);
    }

    #[test]
    fn test_mix_is_not_identity() {
        assert_ne!(mix(0), 0);
        assert_ne!(mix(1), mix(2));
    }
}
