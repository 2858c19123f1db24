//! Second-block search.
//!
//! Starts from the two IHVs of block 1 and looks for a block whose companion
//! (`block - MESSAGE_DELTA`) cancels the remaining difference. Modification
//! levels, outermost first:
//!
//! 1. Q1..Q14 drawn from the path patterns, sign bits tied to the IV.
//! 2. Q15/Q16 redrawn up to 2^25 times (multi-message modification).
//! 3. Q1/Q2 redrawn on the bits where the IV's `b` and `c` agree, which
//!    leaves x1 untouched.
//! 4. Q4 bits 14..16 and 23..25.
//! 5. Tunnel on Q9 bits 3..5, 11, 19, 21..23.

use log::{debug, info};

use crate::bits::bit;
use crate::block1::Block1Found;
use crate::error::{CollisionResult, Stage};
use crate::mask::MaskTable;
use crate::md5::{compress, ChainingState, StateTrace};
use crate::path::{self, sign, Tail};
use crate::rng::Lcg;
use crate::search::{Budget, SearchStats};

/// Mask tables of block 2.
#[derive(Debug, Clone)]
pub struct Block2Tables {
    pub q4: MaskTable,
    pub q9: MaskTable,
}

impl Block2Tables {
    pub fn new() -> CollisionResult<Self> {
        Ok(Self {
            q4: MaskTable::generate(&path::BLOCK2_Q4_TUNNEL)?,
            q9: MaskTable::generate(&path::BLOCK2_Q9_TUNNEL)?,
        })
    }
}

/// A second block closing the collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block2Found {
    pub block: [u32; 16],
    /// `block - MESSAGE_DELTA`
    pub companion: [u32; 16],
    /// Shared IHV of both messages after two blocks
    pub ihv: ChainingState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Saved {
    q1: u32,
    q2: u32,
    q4: u32,
    q9: u32,
}

/// Q1/Q2 modification over the bits where the IV's `b` and `c` agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Q1Q2Modification {
    mask: u32,
    q1_fixed: u32,
    q2_fixed: u32,
}

impl Q1Q2Modification {
    fn draws(&self) -> u64 {
        1u64 << self.mask.count_ones()
    }
}

/// Working state of a block-2 search.
#[derive(Debug, Clone)]
pub struct Block2Search<'a> {
    tables: &'a Block2Tables,
    q9_tunnel: bool,
    iv: ChainingState,
    companion_iv: ChainingState,
    q: StateTrace,
    x: [u32; 16],
    saved: Saved,
    stats: SearchStats,
}

impl<'a> Block2Search<'a> {
    /// Continue from `block1`: the first message's IHV seeds the trace, the
    /// companion's IHV seeds the differential check.
    pub fn new(block1: &Block1Found, tables: &'a Block2Tables, q9_tunnel: bool) -> Self {
        Self {
            tables,
            q9_tunnel,
            iv: block1.ihv,
            companion_iv: block1.companion_ihv,
            q: StateTrace::new(block1.ihv),
            x: [0; 16],
            saved: Saved::default(),
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn run(&mut self, rng: &mut Lcg, budget: &Budget) -> CollisionResult<Block2Found> {
        info!("Generating block 2 ...");
        loop {
            budget.check(Stage::Block2, self.stats.attempts)?;
            self.stats.attempts += 1;

            let modification = self.generate(rng);
            if let Some(found) = self.modify_q16(rng, budget, &modification)? {
                debug!("Block 2 stats: {:?}", self.stats);
                return Ok(found);
            }
        }
    }

    /// Draw Q1..Q14 and prepare the Q1/Q2 modification.
    fn generate(&mut self, rng: &mut Lcg) -> Q1Q2Modification {
        let reference = self.iv.b;
        self.q = StateTrace::new(self.iv);
        for pattern in path::BLOCK2_PATTERNS.iter() {
            pattern.fill(&mut self.q, rng, reference);
        }

        let q = &self.q;
        let mask = !(self.iv.b ^ self.iv.c) & path::BLOCK2_Q1_Q2_CANDIDATES;
        self.saved = Saved {
            q1: q[1],
            q2: q[2],
            q4: q[4],
            q9: q[9],
        };
        Q1Q2Modification {
            mask,
            q1_fixed: q[1] & !mask,
            q2_fixed: q[2] & !mask,
        }
    }

    fn modify_q16(
        &mut self,
        rng: &mut Lcg,
        budget: &Budget,
        modification: &Q1Q2Modification,
    ) -> CollisionResult<Option<Block2Found>> {
        for _ in 0..path::BLOCK2_Q16_DRAWS {
            budget.check_cancelled(Stage::Block2, self.stats.attempts)?;

            if !self.draw_q15_q16(rng) {
                continue;
            }
            self.stats.accepted += 1;

            if let Some(found) = self.modify_q1_q2(rng, modification) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Fresh Q15/Q16, then the conditions on Q17..Q19.
    fn draw_q15_q16(&mut self, rng: &mut Lcg) -> bool {
        let s = self.saved;
        self.q[1] = s.q1;
        self.q[2] = s.q2;
        self.q[4] = s.q4;
        self.q[9] = s.q9;

        for pattern in path::BLOCK2_Q15_Q16_PATTERNS.iter() {
            pattern.fill(&mut self.q, rng, 0);
        }

        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 2);
        q.derive_word(x, 7);
        q.derive_word(x, 12);

        // Σ17 bits 25..=27 not all ones
        let sigma17 = q.sigma(x, 17);
        if sigma17 & 0x0700_0000 == 0x0700_0000 {
            return false;
        }
        q.advance_with(17, sigma17);
        if q[17] & 0x8002_8008 != q[16] & 0x8002_8008 {
            return false;
        }

        q.advance(x, 18);
        if bit(q[18], 18) != 1 || q[18] & 0xa000_0000 != q[17] & 0xa000_0000 {
            return false;
        }

        // Σ19 bits 4..=18 not all ones
        let sigma19 = q.sigma(x, 19);
        if sigma19 & 0x0003_fff8 == 0x0003_fff8 {
            return false;
        }
        q.advance_with(19, sigma19);
        if bit(q[19], 18) != 0 || sign(q[19]) != sign(q[18]) {
            return false;
        }

        q.derive_word(x, 11);
        q.derive_word(x, 16);
        true
    }

    fn modify_q1_q2(
        &mut self,
        rng: &mut Lcg,
        modification: &Q1Q2Modification,
    ) -> Option<Block2Found> {
        (0..modification.draws()).find_map(|_| {
            if self.draw_q1_q2(rng, modification) {
                self.modify_q4()
            } else {
                None
            }
        })
    }

    /// Redraw the free Q1/Q2 bits and check Q20..Q24.
    fn draw_q1_q2(&mut self, rng: &mut Lcg, m: &Q1Q2Modification) -> bool {
        self.q[4] = self.saved.q4;
        self.q[9] = self.saved.q9;

        let q1 = (rng.next_u32() & m.mask).wrapping_add(m.q1_fixed);
        self.q[1] = q1;
        self.q[2] = (q1 & m.mask).wrapping_add(m.q2_fixed);

        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 1);

        // Σ20 bits 30..=32 not all zeros
        let sigma20 = q.sigma(x, 20);
        if sigma20 & 0xe000_0000 == 0 {
            return false;
        }
        q.advance_with(20, sigma20);
        if sign(q[20]) != sign(q[19]) {
            return false;
        }

        q.derive_word(x, 6);
        q.advance(x, 21);
        if q[21] & 0x8002_0000 != q[20] & 0x8002_0000 {
            return false;
        }

        q.advance(x, 22);
        if sign(q[22]) != sign(q[21]) {
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

        q.derive_word(x, 5);
        q.advance(x, 24);
        if sign(q[24]) != 1 {
            return false;
        }

        q.derive_word(x, 3);
        q.derive_word(x, 14);
        q.derive_word(x, 15);
        true
    }

    fn modify_q4(&mut self) -> Option<Block2Found> {
        let tables = self.tables;
        tables.q4.entries().iter().find_map(|&mask| {
            if self.flip_q4(mask) {
                self.tunnel_q9()
            } else {
                None
            }
        })
    }

    /// Flip Q4 bits, recheck Q24 and derive x3 and x7.
    fn flip_q4(&mut self, mask: u32) -> bool {
        self.q[4] = self.saved.q4 ^ mask;
        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 5);
        q.advance(x, 24);
        if sign(q[24]) != 1 {
            return false;
        }
        q.derive_word(x, 4);
        q.derive_word(x, 8);
        true
    }

    fn tunnel_q9(&mut self) -> Option<Block2Found> {
        let tables = self.tables;
        tables
            .q9
            .domain(self.q9_tunnel)
            .iter()
            .find_map(|&mask| self.flip_q9(mask))
    }

    fn flip_q9(&mut self, mask: u32) -> Option<Block2Found> {
        self.q[9] = self.saved.q9 ^ mask;
        let (q, x) = (&mut self.q, &mut self.x);
        q.derive_word(x, 9);
        q.derive_word(x, 10);
        q.derive_word(x, 13);
        self.finish()
    }

    fn finish(&mut self) -> Option<Block2Found> {
        if !path::verify_tail(&mut self.q, &self.x, Tail::Block2) {
            return None;
        }

        self.stats.completions += 1;
        let ihv = self.q.output();
        let companion = path::apply_delta(&self.x, false);
        if compress(self.companion_iv, &companion) != ihv {
            return None;
        }

        Some(Block2Found {
            block: self.x,
            companion,
            ihv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block1::{Block1Search, Block1Tables, Block1Tunnels};
    use crate::collision::WANG_COLLISION_0;

    fn wang_block1() -> Block1Found {
        let iv = ChainingState::STANDARD;
        let block = WANG_COLLISION_0.block1;
        let companion = WANG_COLLISION_0.block1_prime;
        Block1Found {
            block,
            companion,
            ihv: compress(iv, &block),
            companion_ihv: compress(iv, &companion),
        }
    }

    #[test]
    fn test_sign_bits_follow_iv() {
        let tables = Block2Tables::new().unwrap();
        let block1 = wang_block1();
        let mut search = Block2Search::new(&block1, &tables, true);
        let mut rng = Lcg::new(11);
        search.generate(&mut rng);

        let b_sign = sign(block1.ihv.b);
        for t in [1, 2, 3, 4, 7, 8, 9, 10, 11, 12] {
            assert_eq!(sign(search.q[t]), b_sign ^ 1, "Q{}", t);
        }
        for t in [5, 6, 13, 14] {
            assert_eq!(sign(search.q[t]), b_sign, "Q{}", t);
        }
    }

    #[test]
    fn test_q1_q2_modification_keeps_x1() {
        let tables = Block2Tables::new().unwrap();
        let block1 = wang_block1();
        let mut search = Block2Search::new(&block1, &tables, true);
        let mut rng = Lcg::new(12);
        let modification = search.generate(&mut rng);
        while !search.draw_q15_q16(&mut rng) {}
        let x1 = search.x[1];

        for _ in 0..64 {
            search.draw_q1_q2(&mut rng, &modification);
            let mut replay = search.x;
            search.q.derive_word(&mut replay, 2);
            assert_eq!(replay[1], x1);
        }
        assert_eq!(modification.mask & !path::BLOCK2_Q1_Q2_CANDIDATES, 0);
    }

    #[test]
    fn test_q4_flip_is_reversible() {
        let tables = Block2Tables::new().unwrap();
        let block1 = wang_block1();
        let mut search = Block2Search::new(&block1, &tables, true);
        let mut rng = Lcg::new(13);
        search.generate(&mut rng);
        let q4 = search.q[4];

        for &mask in tables.q4.entries() {
            search.flip_q4(mask);
            assert_eq!(search.q[4] ^ q4, mask);
        }
        search.flip_q4(0);
        assert_eq!(search.q[4], q4);
    }

    #[test]
    fn test_chains_on_found_first_block() {
        let tables1 = Block1Tables::new().unwrap();
        let tables2 = Block2Tables::new().unwrap();
        let mut rng = Lcg::new(8);
        let budget = Budget::unbounded();

        let block1 = Block1Search::new(ChainingState::STANDARD, &tables1, Block1Tunnels::default())
            .run(&mut rng, &budget)
            .unwrap();
        let mut search = Block2Search::new(&block1, &tables2, true);
        let block2 = search.run(&mut rng, &budget).unwrap();

        let replay = StateTrace::from_block(block1.ihv, &block2.block);
        for t in -3..=64 {
            assert_eq!(replay[t], search.q[t], "Q[{}]", t);
        }
        assert_eq!(block2.ihv, compress(block1.ihv, &block2.block));
        assert_eq!(block2.ihv, compress(block1.companion_ihv, &block2.companion));
        assert_ne!(block2.block, block2.companion);
    }
}
