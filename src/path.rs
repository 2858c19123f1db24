//! Constants of the two-block differential path of Wang et al.
//!
//! Each state word Q[1..=17] (block 1) or Q[1..=16] (block 2) is drawn from a
//! [`Pattern`]: free bits from the generator, bits forced to one, and bits
//! copied (or copied inverted) from earlier words so that sufficient
//! conditions of the form `Q[t][i] = Q[t-1][i]` hold by construction. Forced
//! zeros are simply the bits no other part of the pattern touches.
//!
//! The conditions from step 25 on are shared by both blocks and live in
//! [`verify_tail`].

use crate::bits::{bit, SIGN_BIT};
use crate::md5::{ChainingState, StateTrace};
use crate::rng::Lcg;

/// How the sign bit of a block-2 state word relates to the IV's `b` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignRule {
    /// No constraint, the sign bit comes from the rest of the pattern
    Free,
    /// Sign bit equal to the sign of `b`
    Same,
    /// Sign bit opposite to the sign of `b`
    Opposite,
}

/// Bit pattern a state word is generated from.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    /// Step number of the generated word
    pub step: i32,
    /// Bits taken from the generator; no draw happens when zero
    pub random: u32,
    /// Bits forced to one
    pub ones: u32,
    /// `(step, mask)`: bits copied from an earlier word
    pub copied: &'static [(i32, u32)],
    /// `(step, mask)`: bits copied inverted from an earlier word
    pub inverted: &'static [(i32, u32)],
    pub sign: SignRule,
}

const fn pattern(step: i32, random: u32, ones: u32, copied: &'static [(i32, u32)]) -> Pattern {
    Pattern {
        step,
        random,
        ones,
        copied,
        inverted: &[],
        sign: SignRule::Free,
    }
}

const fn signed(
    step: i32,
    random: u32,
    ones: u32,
    copied: &'static [(i32, u32)],
    sign: SignRule,
) -> Pattern {
    Pattern {
        step,
        random,
        ones,
        copied,
        inverted: &[],
        sign,
    }
}

impl Pattern {
    /// Draw a value for the pattern's word given the earlier words in `q`.
    /// `reference` is the word the sign rule compares against.
    #[inline]
    pub fn draw(&self, q: &StateTrace, rng: &mut Lcg, reference: u32) -> u32 {
        let mut value = if self.random != 0 {
            rng.next_u32() & self.random
        } else {
            0
        };
        value = value.wrapping_add(self.ones);
        for &(step, mask) in self.copied {
            value = value.wrapping_add(q[step] & mask);
        }
        for &(step, mask) in self.inverted {
            value = value.wrapping_add(!q[step] & mask);
        }
        match self.sign {
            SignRule::Free => value,
            SignRule::Same => value.wrapping_add(reference & SIGN_BIT),
            SignRule::Opposite => value.wrapping_add(!reference & SIGN_BIT),
        }
    }

    /// Draw and store the pattern's word.
    #[inline]
    pub fn fill(&self, q: &mut StateTrace, rng: &mut Lcg, reference: u32) {
        q[self.step] = self.draw(q, rng, reference);
    }
}

/// Block-1 patterns for Q1 and Q3..=Q17, in generation order.
/// Q2 follows from x1 once Q13..Q17 are fixed.
pub const BLOCK1_PATTERNS: [Pattern; 16] = [
    pattern(1, 0xffff_ffff, 0, &[]),
    pattern(3, 0xfff7_f7bf, 0, &[]),
    pattern(4, 0x7f00_000f, 0x8008_0830, &[(3, 0x0077_f780)]),
    pattern(5, 0x0100_0000, 0x8840_0025, &[]),
    pattern(6, 0, 0x027f_bc41, &[(5, 0x0100_0000)]),
    pattern(7, 0, 0x03fe_f820, &[]),
    pattern(8, 0x0060_5000, 0x0191_0540, &[]),
    pattern(9, 0x00e0_4000, 0xfb10_2f3d, &[(8, 0x0000_1000)]),
    pattern(10, 0x0f00_4e3c, 0x701f_9040, &[]),
    pattern(11, 0x0a10_0a3c, 0x20e1_80c2, &[(10, 0x0000_4000)]),
    pattern(12, 0x1cf0_0e7f, 0x0008_1100, &[(11, 0x0300_0000)]),
    pattern(13, 0x3cf0_1e77, 0x410f_e008, &[]),
    pattern(14, 0x1cf0_1e77, 0x000b_e188, &[]),
    pattern(15, 0x80ff_3f80, 0x6100_8000, &[]),
    Pattern {
        step: 16,
        random: 0x03df_ff88,
        ones: 0x2000_0000,
        copied: &[(15, 0x8000_0000)],
        inverted: &[(15, 0x0020_0000)],
        sign: SignRule::Free,
    },
    pattern(17, 0x3ffd_7ff7, 0x4000_0000, &[(16, 0x8000_8008)]),
];

/// Block-2 patterns for Q1..=Q14, drawn once per attempt.
pub const BLOCK2_PATTERNS: [Pattern; 14] = [
    signed(1, 0x71de_f7df, 0x0421_0000, &[], SignRule::Opposite),
    signed(2, 0x0000_0018, 0x0c01_0800, &[(1, 0x71de_77c1)], SignRule::Opposite),
    signed(3, 0x01c0_6600, 0x3e1f_8967, &[(2, 0x0000_0018)], SignRule::Opposite),
    signed(4, 0x01c0_e000, 0x3a04_0011, &[(3, 0x0000_0600)], SignRule::Opposite),
    signed(5, 0x0200_0000, 0x482f_0e50, &[], SignRule::Same),
    signed(6, 0x600c_0000, 0x05e2_ec56, &[], SignRule::Same),
    signed(7, 0x604c_203e, 0x1781_9e01, &[], SignRule::Opposite),
    signed(8, 0x604c_7c1c, 0x0432_83e0, &[(7, 0x0000_0002)], SignRule::Opposite),
    signed(9, 0x607c_6c1c, 0x1c01_01c1, &[(8, 0x0000_1000)], SignRule::Opposite),
    signed(10, 0x0008_6000, 0x1f83_8bc0, &[(9, 0x6000_0000)], SignRule::Opposite),
    signed(11, 0x7f80_0020, 0x0075_87df, &[(10, 0x0008_6000)], SignRule::Opposite),
    signed(12, 0x00f0_0f5f, 0x0008_1080, &[(11, 0x7f00_0020)], SignRule::Opposite),
    signed(13, 0x0070_1f77, 0x3f0f_e008, &[], SignRule::Same),
    signed(14, 0x0070_1f77, 0x408b_e088, &[], SignRule::Same),
];

/// Block-2 patterns for Q15 and Q16, redrawn on every Q16 modification.
pub const BLOCK2_Q15_Q16_PATTERNS: [Pattern; 2] = [
    pattern(15, 0x00fc_3ff7, 0x7d02_0000, &[]),
    pattern(16, 0x4ffc_7ff7, 0x2001_8008, &[(15, 0x8000_0000)]),
];

/// Tunnel bit positions of block 1.
pub const BLOCK1_Q4_TUNNEL: [u32; 1] = [26];
pub const BLOCK1_Q9_TUNNEL: [u32; 3] = [22, 23, 24];
pub const BLOCK1_Q10_TUNNEL: [u32; 3] = [11, 25, 27];
pub const BLOCK1_Q13_TUNNEL: [u32; 12] = [2, 3, 5, 7, 10, 11, 12, 21, 22, 23, 28, 29];
pub const BLOCK1_Q14_TUNNEL: [u32; 9] = [1, 2, 3, 5, 6, 7, 27, 28, 29];
pub const BLOCK1_Q20_TUNNEL: [u32; 6] = [1, 2, 10, 15, 22, 24];

/// Tunnel and modification bit positions of block 2.
pub const BLOCK2_Q4_TUNNEL: [u32; 6] = [14, 15, 16, 23, 24, 25];
pub const BLOCK2_Q9_TUNNEL: [u32; 8] = [3, 4, 5, 11, 19, 21, 22, 23];

/// Number of fresh Q15/Q16 draws per block-2 attempt.
pub const BLOCK2_Q16_DRAWS: u32 = 1 << 25;

/// Bits of Q1/Q2 that may change together in block 2 when the IV's `b` and
/// `c` words agree there.
pub const BLOCK2_Q1_Q2_CANDIDATES: u32 = 0x71de_77c1;

/// Q14 tunnel: bits of Q3, Q4 and Q14 that stay fixed.
pub const Q14_TUNNEL_Q3_FIXED: u32 = 0x77ff_ffda;
pub const Q14_TUNNEL_Q4_FIXED: u32 = 0x8bff_fff5;
pub const Q14_TUNNEL_Q14_FIXED: u32 = 0xe3ff_ff88;
/// Q14 tunnel: bits of the compensation term Q3 and Q4 absorb.
pub const Q14_TUNNEL_Q3_FREE: u32 = 0x8800_0025;
pub const Q14_TUNNEL_Q4_FREE: u32 = 0x7400_000a;
/// Q14 tunnel: the compensation term must be zero here.
pub const Q14_TUNNEL_REJECT: u32 = 0x03ff_ffd0;

/// Additive message difference of block 1, applied as `x + delta`.
/// Block 2 applies it as `x - delta`.
pub const MESSAGE_DELTA: [u32; 16] = [
    0, 0, 0, 0,
    0x8000_0000, // 2^31 on word 4
    0, 0, 0, 0, 0, 0,
    0x0000_8000, // 2^15 on word 11
    0, 0,
    0x8000_0000, // 2^31 on word 14
    0,
];

/// IHV difference after block 1: companion minus base.
pub const BLOCK1_IHV_DELTA: ChainingState =
    ChainingState::custom(0x8000_0000, 0x8200_0000, 0x8200_0000, 0x8200_0000);

/// Companion message word-wise: `x + delta` when `add`, else `x - delta`.
pub fn apply_delta(x: &[u32; 16], add: bool) -> [u32; 16] {
    let mut companion = *x;
    for (word, delta) in companion.iter_mut().zip(MESSAGE_DELTA.iter()) {
        *word = if add {
            word.wrapping_add(*delta)
        } else {
            word.wrapping_sub(*delta)
        };
    }
    companion
}

/// Sign bit of `value` as 0 or 1.
#[inline(always)]
pub fn sign(value: u32) -> u32 {
    bit(value, 32)
}

/// Which block's tail conditions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    Block1,
    Block2,
}

/// Compute Q25..=Q64 and check the conditions of steps 25 to 64.
///
/// Requires Q[-3..=24] and the whole message in place. Returns `false` at the
/// first violated condition; Q values past that step are left stale.
#[inline]
pub fn verify_tail(q: &mut StateTrace, x: &[u32; 16], tail: Tail) -> bool {
    for t in 25..=34 {
        q.advance(x, t);
    }

    let sigma35 = q.sigma(x, 35);
    let required = match tail {
        Tail::Block1 => 0,
        Tail::Block2 => 1,
    };
    if bit(sigma35, 16) != required {
        return false;
    }
    q.advance_with(35, sigma35);

    for t in 36..=48 {
        q.advance(x, t);
    }
    if sign(q[46]) != sign(q[48]) {
        return false;
    }

    q.advance(x, 49);
    if sign(q[49]) != sign(q[47]) {
        return false;
    }

    q.advance(x, 50);
    if sign(q[50]) != sign(q[48]) ^ 1 {
        return false;
    }

    for t in 51..=59 {
        q.advance(x, t);
        if sign(q[t]) != sign(q[t - 2]) {
            return false;
        }
    }

    q.advance(x, 60);
    if bit(q[60], 26) != 0 || sign(q[60]) != sign(q[58]) ^ 1 {
        return false;
    }

    q.advance(x, 61);
    if bit(q[61], 26) != 1 || sign(q[61]) != sign(q[59]) {
        return false;
    }

    // Σ62 bits 16..=22
    let sigma62 = q.sigma(x, 62);
    let window = sigma62 & 0x003f_8000;
    match tail {
        Tail::Block1 if window == 0x003f_8000 => return false,
        Tail::Block2 if window == 0 => return false,
        _ => {}
    }
    q.advance_with(62, sigma62);

    match tail {
        Tail::Block1 => {
            q.advance(x, 63);
            q.advance(x, 64);
            true
        }
        Tail::Block2 => {
            if bit(q[62], 26) != 1 || sign(q[62]) != sign(q[60]) {
                return false;
            }
            q.advance(x, 63);
            if bit(q[63], 26) != 1 || sign(q[63]) != sign(q[61]) {
                return false;
            }
            q.advance(x, 64);
            bit(q[64], 26) == 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskTable;

    #[test]
    fn test_patterns_are_consistent() {
        for p in BLOCK1_PATTERNS
            .iter()
            .chain(BLOCK2_PATTERNS.iter())
            .chain(BLOCK2_Q15_Q16_PATTERNS.iter())
        {
            let mut used = p.random | p.ones;
            assert_eq!(p.random & p.ones, 0, "Q{}", p.step);
            for &(step, mask) in p.copied.iter().chain(p.inverted.iter()) {
                assert!(step < p.step, "Q{} copies from a later word", p.step);
                assert_eq!(used & mask, 0, "Q{} overlapping bits", p.step);
                used |= mask;
            }
            if p.sign != SignRule::Free {
                assert_eq!(used & SIGN_BIT, 0, "Q{} sign bit", p.step);
            }
        }
    }

    #[test]
    fn test_fixed_patterns_draw_no_randomness() {
        let q = StateTrace::new(ChainingState::STANDARD);
        let mut rng = Lcg::new(7);
        let before = rng.state();
        assert_eq!(BLOCK1_PATTERNS[5].draw(&q, &mut rng, 0), 0x03fe_f820);
        assert_eq!(rng.state(), before);
    }

    #[test]
    fn test_block1_q4_copies_q3() {
        let mut q = StateTrace::new(ChainingState::STANDARD);
        q[3] = 0xffff_ffff;
        let mut rng = Lcg::new(0);
        let q4 = BLOCK1_PATTERNS[2].draw(&q, &mut rng, 0);
        assert_eq!(q4 & 0x0077_f780, 0x0077_f780);
        assert_eq!(q4 & 0x8008_0830, 0x8008_0830);
        assert_eq!(q4 & 0x0080_0040, 0);
    }

    #[test]
    fn test_sign_rules() {
        let q = StateTrace::new(ChainingState::STANDARD);
        let mut rng = Lcg::new(3);
        let q5 = BLOCK2_PATTERNS[4].draw(&q, &mut rng, 0x8000_0000);
        assert_eq!(sign(q5), 1);
        let q1 = BLOCK2_PATTERNS[0].draw(&q, &mut rng, 0x8000_0000);
        assert_eq!(sign(q1), 0);
    }

    #[test]
    fn test_tunnel_tables_build() {
        for positions in [
            &BLOCK1_Q4_TUNNEL[..],
            &BLOCK1_Q9_TUNNEL[..],
            &BLOCK1_Q10_TUNNEL[..],
            &BLOCK1_Q13_TUNNEL[..],
            &BLOCK1_Q14_TUNNEL[..],
            &BLOCK1_Q20_TUNNEL[..],
            &BLOCK2_Q4_TUNNEL[..],
            &BLOCK2_Q9_TUNNEL[..],
        ] {
            let table = MaskTable::generate(positions).unwrap();
            assert_eq!(table.entries().len(), 1 << positions.len());
        }
    }

    #[test]
    fn test_q14_tunnel_masks_partition() {
        let span = MaskTable::generate(&BLOCK1_Q14_TUNNEL).unwrap().span();
        assert_eq!(span, !Q14_TUNNEL_Q14_FIXED);
        assert_eq!(Q14_TUNNEL_Q3_FREE, !Q14_TUNNEL_Q3_FIXED);
        assert_eq!(Q14_TUNNEL_Q4_FREE, !Q14_TUNNEL_Q4_FIXED);
        assert_eq!(
            Q14_TUNNEL_Q3_FREE | Q14_TUNNEL_Q4_FREE | Q14_TUNNEL_REJECT,
            0xffff_ffff
        );
    }

    #[test]
    fn test_apply_delta_inverts() {
        let x: [u32; 16] = core::array::from_fn(|k| k as u32 * 0x0101_0101);
        let companion = apply_delta(&x, true);
        assert_eq!(apply_delta(&companion, false), x);
        assert_eq!(companion[4], x[4] ^ 0x8000_0000);
        assert_eq!(companion[11], x[11].wrapping_add(0x8000));
    }
}
