//! First-block search.
//!
//! An attempt draws Q1 and Q3..Q17 from the path patterns, derives the
//! message words those states pin down and checks Q18..Q24 forwards. A state
//! that passes is then perturbed through six nested tunnels
//! (Q10, Q20, Q13, Q14, Q4, Q9). Each tunnel flips a group of bits in one
//! state word, re-derives the affected message words and rechecks only the
//! conditions that can move. The innermost level runs the remaining steps and
//! the differential check against the companion message.

use log::{debug, info};

use crate::bits::bit;
use crate::error::{CollisionResult, Stage};
use crate::mask::MaskTable;
use crate::md5::{compress, f, g, ChainingState, StateTrace};
use crate::path::{self, sign, Tail};
use crate::rng::Lcg;
use crate::search::{Budget, SearchStats};

/// Which block-1 tunnels walk their full mask table.
///
/// A disabled tunnel still runs once with the empty mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block1Tunnels {
    pub q4: bool,
    pub q9: bool,
    pub q10: bool,
    pub q13: bool,
    pub q14: bool,
    pub q20: bool,
}

impl Default for Block1Tunnels {
    fn default() -> Self {
        Self {
            q4: true,
            q9: true,
            q10: true,
            q13: true,
            q14: true,
            q20: true,
        }
    }
}

/// Mask tables of the block-1 tunnels, built once per search.
#[derive(Debug, Clone)]
pub struct Block1Tables {
    pub q4: MaskTable,
    pub q9: MaskTable,
    pub q10: MaskTable,
    pub q13: MaskTable,
    pub q14: MaskTable,
    pub q20: MaskTable,
}

impl Block1Tables {
    pub fn new() -> CollisionResult<Self> {
        Ok(Self {
            q4: MaskTable::generate(&path::BLOCK1_Q4_TUNNEL)?,
            q9: MaskTable::generate(&path::BLOCK1_Q9_TUNNEL)?,
            q10: MaskTable::generate(&path::BLOCK1_Q10_TUNNEL)?,
            q13: MaskTable::generate(&path::BLOCK1_Q13_TUNNEL)?,
            q14: MaskTable::generate(&path::BLOCK1_Q14_TUNNEL)?,
            q20: MaskTable::generate(&path::BLOCK1_Q20_TUNNEL)?,
        })
    }
}

/// A first block whose companion reaches the block-1 IHV difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block1Found {
    /// Message words of the first message's block
    pub block: [u32; 16],
    /// `block + MESSAGE_DELTA`
    pub companion: [u32; 16],
    /// IHV after `block`
    pub ihv: ChainingState,
    /// IHV after `companion`
    pub companion_ihv: ChainingState,
}

/// Values saved after forward verification; tunnels restore from these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Saved {
    x1: u32,
    x4: u32,
    x15: u32,
    q3: u32,
    q4: u32,
    q9: u32,
    q10: u32,
    q13: u32,
    q14: u32,
    q20: u32,
    q21: u32,
}

/// Q14 tunnel terms computed once per entry into the tunnel.
#[derive(Debug, Clone, Copy)]
struct Q14Compensation {
    q3_fixed: u32,
    q4_fixed: u32,
    q14_fixed: u32,
    constant: u32,
}

/// Working state of a block-1 search.
#[derive(Debug, Clone)]
pub struct Block1Search<'a> {
    tables: &'a Block1Tables,
    tunnels: Block1Tunnels,
    iv: ChainingState,
    q: StateTrace,
    x: [u32; 16],
    saved: Saved,
    stats: SearchStats,
}

impl<'a> Block1Search<'a> {
    pub fn new(iv: ChainingState, tables: &'a Block1Tables, tunnels: Block1Tunnels) -> Self {
        Self {
            tables,
            tunnels,
            iv,
            q: StateTrace::new(iv),
            x: [0; 16],
            saved: Saved::default(),
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Search until a block is found or the budget runs out.
    pub fn run(&mut self, rng: &mut Lcg, budget: &Budget) -> CollisionResult<Block1Found> {
        info!("Generating block 1 ...");
        loop {
            budget.check(Stage::Block1, self.stats.attempts)?;
            self.stats.attempts += 1;

            if !self.generate(rng) {
                continue;
            }
            self.stats.accepted += 1;
            self.save();

            if let Some(found) = self.tunnel_q10() {
                debug!("Block 1 stats: {:?}", self.stats);
                return Ok(found);
            }
        }
    }

    /// Draw Q1, Q3..Q17, derive the message words they fix and check
    /// Q18..Q24.
    fn generate(&mut self, rng: &mut Lcg) -> bool {
        self.q = StateTrace::new(self.iv);
        for pattern in path::BLOCK1_PATTERNS.iter() {
            pattern.fill(&mut self.q, rng, 0);
        }

        let q = &mut self.q;
        let x = &mut self.x;
        q.derive_word(x, 1);
        q.derive_word(x, 17);
        q.advance(x, 2);
        for t in [5, 6, 7, 11, 12, 16] {
            q.derive_word(x, t);
        }

        q.advance(x, 18);
        if (q[18] ^ q[17]) & 0xa002_0000 != 0x0002_0000 {
            return false;
        }

        // Σ19 bits 4..=18 not all ones
        let sigma19 = q.sigma(x, 19);
        if sigma19 & 0x0003_fff8 == 0x0003_fff8 {
            return false;
        }
        q.advance_with(19, sigma19);
        if (q[19] ^ q[18]) & 0x8002_0000 != 0x0002_0000 {
            return false;
        }

        // Σ20 bits 30..=32 not all zeros
        let sigma20 = q.sigma(x, 20);
        if sigma20 & 0xe000_0000 == 0 {
            return false;
        }
        q.advance_with(20, sigma20);
        if sign(q[20]) != sign(q[15]) {
            return false;
        }

        self.q21_to_q24()
    }

    fn save(&mut self) {
        let (q, x) = (&self.q, &self.x);
        self.saved = Saved {
            x1: x[1],
            x4: x[4],
            x15: x[15],
            q3: q[3],
            q4: q[4],
            q9: q[9],
            q10: q[10],
            q13: q[13],
            q14: q[14],
            q20: q[20],
            q21: q[21],
        };
    }

    fn q21_to_q24(&mut self) -> bool {
        let (q, x) = (&mut self.q, &self.x);
        q.advance(x, 21);
        if (q[21] ^ q[20]) & 0x8002_0000 != 0 {
            return false;
        }
        self.q22_to_q24()
    }

    fn q22_to_q24(&mut self) -> bool {
        let (q, x) = (&mut self.q, &self.x);
        q.advance(x, 22);
        if sign(q[22]) != sign(q[15]) {
            return false;
        }

        // Σ23 bit 18 zero
        let sigma23 = q.sigma(x, 23);
        if bit(sigma23, 18) != 0 {
            return false;
        }
        q.advance_with(23, sigma23);
        if sign(q[23]) != 0 {
            return false;
        }

        q.advance(x, 24);
        sign(q[24]) == 1
    }

    fn tunnel_q10(&mut self) -> Option<Block1Found> {
        let tables = self.tables;
        tables
            .q10
            .domain(self.tunnels.q10)
            .iter()
            .find_map(|&mask| {
                if self.modify_q10(mask) {
                    self.tunnel_q20()
                } else {
                    None
                }
            })
    }

    /// Flip Q10 bits 11, 25, 27 and recheck Q22..Q24 through x10.
    fn modify_q10(&mut self, mask: u32) -> bool {
        let s = self.saved;
        self.q[9] = s.q9;
        self.q[13] = s.q13;
        self.q[20] = s.q20;
        self.q[21] = s.q21;
        self.x[4] = s.x4;
        self.x[15] = s.x15;

        self.q[10] = s.q10 ^ mask;
        self.q.derive_word(&mut self.x, 11);
        self.q22_to_q24()
    }

    fn tunnel_q20(&mut self) -> Option<Block1Found> {
        let tables = self.tables;
        tables
            .q20
            .domain(self.tunnels.q20)
            .iter()
            .find_map(|&mask| {
                if self.modify_q20(mask) {
                    self.tunnel_q13()
                } else {
                    None
                }
            })
    }

    /// Flip Q20 bits and absorb the change in x0, Q1, Q2, x4 and x5.
    fn modify_q20(&mut self, mask: u32) -> bool {
        let s = self.saved;
        self.q[3] = s.q3;
        self.q[4] = s.q4;
        self.x[1] = s.x1;
        self.x[15] = s.x15;

        self.q[20] = s.q20 ^ mask;
        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 20);
        q.advance(x, 1);
        q.advance(x, 2);
        q.derive_word(x, 5);
        q.derive_word(x, 6);
        self.q21_to_q24()
    }

    fn tunnel_q13(&mut self) -> Option<Block1Found> {
        let tables = self.tables;
        tables
            .q13
            .domain(self.tunnels.q13)
            .iter()
            .find_map(|&mask| {
                if self.modify_q13(mask) {
                    self.tunnel_q14()
                } else {
                    None
                }
            })
    }

    /// Flip Q13 bits and absorb the change in x1, Q2, x4, x5 and x15.
    fn modify_q13(&mut self, mask: u32) -> bool {
        let s = self.saved;
        self.q[3] = s.q3;
        self.q[4] = s.q4;
        self.q[14] = s.q14;

        self.q[13] = s.q13 ^ mask;
        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 17);
        q.advance(x, 2);
        q.derive_word(x, 5);
        q.derive_word(x, 6);
        q.derive_word(x, 16);
        self.q21_to_q24()
    }

    /// Terms of the Q14 tunnel for the current Q3..Q7 and Q14..Q18.
    ///
    /// Eliminating x6 between the equations of steps 7 and 18 leaves a
    /// constant that the free bits of Q3 and Q4 must absorb whenever Q14
    /// changes.
    fn q14_compensation(&self) -> Q14Compensation {
        let q = &self.q;
        let q3_fixed = q[3] & path::Q14_TUNNEL_Q3_FIXED;
        let q4_fixed = q[4] & path::Q14_TUNNEL_Q4_FIXED;
        let q14_fixed = q[14] & path::Q14_TUNNEL_Q14_FIXED;

        let constant = q
            .rotated_difference(7)
            .wrapping_sub(0xa830_4613)
            .wrapping_sub(q.rotated_difference(18))
            .wrapping_add(g(q[17], q[16], q[15]))
            .wrapping_add(0xc040_b340)
            .wrapping_sub(f(q[6], q[5], q4_fixed))
            .wrapping_sub(q3_fixed)
            .wrapping_add(q14_fixed);

        Q14Compensation {
            q3_fixed,
            q4_fixed,
            q14_fixed,
            constant,
        }
    }

    fn tunnel_q14(&mut self) -> Option<Block1Found> {
        let tables = self.tables;
        let compensation = self.q14_compensation();
        tables
            .q14
            .domain(self.tunnels.q14)
            .iter()
            .find_map(|&mask| {
                if self.modify_q14(&compensation, mask) {
                    self.tunnel_q4()
                } else {
                    None
                }
            })
    }

    /// Add `mask` to Q14 and move the compensation into Q3/Q4, keeping
    /// Q18 and x5 unchanged. Fails when the compensation does not fit the
    /// free bits.
    fn modify_q14(&mut self, c: &Q14Compensation, mask: u32) -> bool {
        let compensated = c.constant.wrapping_add(mask);
        if compensated & path::Q14_TUNNEL_REJECT != 0 {
            return false;
        }

        self.q[3] = c
            .q3_fixed
            .wrapping_add(compensated & path::Q14_TUNNEL_Q3_FREE);
        self.q[4] = c
            .q4_fixed
            .wrapping_add(compensated & path::Q14_TUNNEL_Q4_FREE);
        self.q[14] = c.q14_fixed.wrapping_add(mask);
        self.q.derive_word(&mut self.x, 3);
        true
    }

    fn tunnel_q4(&mut self) -> Option<Block1Found> {
        let tables = self.tables;
        let base = self.q[4];
        tables
            .q4
            .domain(self.tunnels.q4)
            .iter()
            .find_map(|&mask| {
                if self.modify_q4(base ^ mask) {
                    self.tunnel_q9()
                } else {
                    None
                }
            })
    }

    /// Set Q4, recheck Q24 and derive the remaining early message words.
    fn modify_q4(&mut self, q4: u32) -> bool {
        self.q[4] = q4;
        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 5);
        q.advance(x, 24);
        if sign(q[24]) != 1 {
            return false;
        }
        for t in [4, 7, 8, 14, 15] {
            q.derive_word(x, t);
        }
        true
    }

    fn tunnel_q9(&mut self) -> Option<Block1Found> {
        let tables = self.tables;
        tables
            .q9
            .domain(self.tunnels.q9)
            .iter()
            .find_map(|&mask| self.modify_q9(mask))
    }

    /// Flip Q9 bits 22..24, derive x8, x9, x12 and finish the block.
    fn modify_q9(&mut self, mask: u32) -> Option<Block1Found> {
        self.q[9] = self.saved.q9 ^ mask;
        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 9);
        q.derive_word(x, 10);
        q.derive_word(x, 13);
        self.finish()
    }

    /// Steps 25..64, the IHV conditions and the companion differential.
    fn finish(&mut self) -> Option<Block1Found> {
        if !path::verify_tail(&mut self.q, &self.x, Tail::Block1) {
            return None;
        }

        let ihv = self.q.output();
        if !ihv_conditions_hold(ihv) {
            return None;
        }

        self.stats.completions += 1;
        let companion = path::apply_delta(&self.x, true);
        let companion_ihv = compress(self.iv, &companion);
        if companion_ihv.wrapping_sub(ihv) != path::BLOCK1_IHV_DELTA {
            return None;
        }

        Some(Block1Found {
            block: self.x,
            companion,
            ihv,
            companion_ihv,
        })
    }
}

/// Conditions on the block-1 IHV that the second block's path relies on.
pub fn ihv_conditions_hold(ihv: ChainingState) -> bool {
    let ChainingState { b, c, d, .. } = ihv;
    bit(b, 6) == 0
        && bit(b, 26) == 0
        && bit(b, 27) == 0
        && bit(c, 26) == 1
        && bit(c, 27) == 0
        && bit(d, 26) == 0
        && sign(b) == sign(c)
        && sign(c) == sign(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted_search<'a>(tables: &'a Block1Tables, seed: u32) -> Block1Search<'a> {
        let mut search = Block1Search::new(ChainingState::STANDARD, tables, Block1Tunnels::default());
        let mut rng = Lcg::new(seed);
        while !search.generate(&mut rng) {}
        search.save();
        search
    }

    #[test]
    fn test_generate_meets_pattern_conditions() {
        let tables = Block1Tables::new().unwrap();
        let search = accepted_search(&tables, 1);
        let q = &search.q;

        assert_eq!(q[7], 0x03fe_f820);
        assert_eq!(q[5] & 0x88400025, 0x88400025);
        assert_eq!(sign(q[16]), sign(q[15]));
        assert_eq!(bit(q[16], 22), bit(q[15], 22) ^ 1);
        assert_eq!(sign(q[23]), 0);
        assert_eq!(sign(q[24]), 1);
        assert_eq!(sign(q[20]), sign(q[15]));
        assert_eq!(sign(q[22]), sign(q[15]));
    }

    #[test]
    fn test_generate_derives_consistent_words() {
        let tables = Block1Tables::new().unwrap();
        let search = accepted_search(&tables, 2);
        let q = &search.q;
        let x = &search.x;

        // Every step whose word has been derived must replay forward.
        for t in [1, 2, 5, 6, 7, 11, 12, 16, 17, 18, 19, 20, 21, 22, 23, 24] {
            let mut replay = *q;
            replay.advance(x, t);
            assert_eq!(replay[t], q[t], "step {}", t);
        }
    }

    #[test]
    fn test_tunnel_steps_restore_saved_state() {
        let tables = Block1Tables::new().unwrap();
        let mut search = accepted_search(&tables, 3);

        // The untouched state already passed Q22..Q24 during generation.
        assert!(search.modify_q10(0));
        let (q_first, x_first) = (search.q, search.x);

        for &mask in tables.q10.entries() {
            search.modify_q10(mask);
        }
        assert!(search.modify_q10(0));
        assert_eq!(search.q, q_first);
        assert_eq!(search.x, x_first);
    }

    #[test]
    fn test_q20_tunnel_replays_early_steps() {
        let tables = Block1Tables::new().unwrap();
        let mut search = accepted_search(&tables, 4);

        for &mask in tables.q20.entries() {
            search.modify_q20(mask);
            for t in [1, 2, 5, 6, 20, 21] {
                let mut replay = search.q;
                replay.advance(&search.x, t);
                assert_eq!(replay[t], search.q[t], "mask {:08x} step {}", mask, t);
            }
        }
    }

    #[test]
    fn test_tunnel_steps_are_deterministic() {
        let tables = Block1Tables::new().unwrap();
        let mut search = accepted_search(&tables, 6);

        for &mask in tables.q13.entries().iter().step_by(97) {
            let first = search.modify_q13(mask);
            let (q, x) = (search.q, search.x);
            let second = search.modify_q13(mask);
            assert_eq!(first, second, "mask {:08x}", mask);
            assert_eq!(search.q, q, "mask {:08x}", mask);
            assert_eq!(search.x, x, "mask {:08x}", mask);
        }
    }

    #[test]
    fn test_q14_tunnel_keeps_step_18() {
        let tables = Block1Tables::new().unwrap();
        let mut search = accepted_search(&tables, 5);
        search.modify_q10(0);
        search.modify_q20(0);
        search.modify_q13(0);

        let compensation = search.q14_compensation();
        let q18 = search.q[18];
        let x5 = search.x[5];
        let mut tried = 0;
        for &mask in tables.q14.entries() {
            if !search.modify_q14(&compensation, mask) {
                continue;
            }
            tried += 1;
            let (q, x) = (&mut search.q, &mut search.x);
            q.derive_word(x, 7);
            let mut replay = *q;
            replay.advance(x, 18);
            assert_eq!(replay[18], q18, "mask {:08x}", mask);
            let mut fifth = *x;
            q.derive_word(&mut fifth, 6);
            assert_eq!(fifth[5], x5, "mask {:08x}", mask);
        }
        assert!(tried > 0);
    }

    #[test]
    fn test_found_block_replays_trace() {
        let tables = Block1Tables::new().unwrap();
        let mut search = Block1Search::new(ChainingState::STANDARD, &tables, Block1Tunnels::default());
        let mut rng = Lcg::new(8);
        let found = search.run(&mut rng, &Budget::unbounded()).unwrap();

        let replay = StateTrace::from_block(ChainingState::STANDARD, &found.block);
        for t in -3..=64 {
            assert_eq!(replay[t], search.q[t], "Q[{}]", t);
        }
        assert_eq!(found.ihv, compress(ChainingState::STANDARD, &found.block));
        assert!(ihv_conditions_hold(found.ihv));
        assert_eq!(
            found.companion_ihv.wrapping_sub(found.ihv),
            path::BLOCK1_IHV_DELTA
        );
        assert!(search.stats().attempts >= search.stats().accepted);
        assert!(search.stats().completions >= 1);
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        let tables = Block1Tables::new().unwrap();
        let mut search = Block1Search::new(ChainingState::STANDARD, &tables, Block1Tunnels::default());
        let mut rng = Lcg::new(0);
        let err = search.run(&mut rng, &Budget::new(Some(0), None)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CollisionError::SearchExhausted {
                stage: Stage::Block1,
                attempts: 0
            }
        ));
    }
}
