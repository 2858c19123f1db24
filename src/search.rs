//! Search orchestration: budget, statistics and the two-block pipeline.
//!
//! A pipeline owns one [`Lcg`] and runs block 1 then block 2 with it, so a
//! seed fully determines the collision it produces. Parallel search runs
//! independent pipelines with consecutive seeds; the first to finish raises
//! a shared flag the others poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::block1::{Block1Search, Block1Tables};
use crate::block2::{Block2Search, Block2Tables};
use crate::collision::Collision;
use crate::error::{CollisionError, CollisionResult, Stage};
use crate::md5::ChainingState;
use crate::report::timed;
use crate::rng::Lcg;

pub use crate::block1::Block1Tunnels;

/// Counters of one search stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Fresh candidate states drawn
    pub attempts: u64,
    /// Candidates that passed the early conditions and entered the
    /// modification levels
    pub accepted: u64,
    /// Blocks that met every sufficient condition and reached the
    /// differential check
    pub completions: u64,
}

/// Attempt limit and cancellation shared by both stages of a pipeline.
///
/// The limit applies to each stage separately.
#[derive(Debug, Clone, Default)]
pub struct Budget {
    max_attempts: Option<u64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Budget {
    /// No limit and no cancellation: search until found.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(max_attempts: Option<u64>, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            max_attempts,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Fail if the search was cancelled.
    pub fn check_cancelled(&self, stage: Stage, attempts: u64) -> CollisionResult<()> {
        if self.is_cancelled() {
            return Err(CollisionError::Cancelled { stage, attempts });
        }
        Ok(())
    }

    /// Fail if the search was cancelled or `attempts` reached the limit.
    pub fn check(&self, stage: Stage, attempts: u64) -> CollisionResult<()> {
        self.check_cancelled(stage, attempts)?;
        match self.max_attempts {
            Some(max) if attempts >= max => {
                warn!("{} search gave up after {} attempts", stage, attempts);
                Err(CollisionError::SearchExhausted { stage, attempts })
            }
            _ => Ok(()),
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub seed: u32,
    pub iv: ChainingState,
    pub block1_tunnels: Block1Tunnels,
    pub block2_q9_tunnel: bool,
    /// Attempts allowed per stage, `None` for unbounded
    pub max_attempts: Option<u64>,
}

impl SearchConfig {
    pub fn new(seed: u32, iv: ChainingState) -> Self {
        Self {
            seed,
            iv,
            block1_tunnels: Block1Tunnels::default(),
            block2_q9_tunnel: true,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Timing and counters of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub elapsed: Duration,
    pub stats: SearchStats,
}

/// Outcome of a successful search.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub collision: Collision,
    pub block1: StageReport,
    pub block2: StageReport,
}

impl SearchReport {
    pub fn total_elapsed(&self) -> Duration {
        self.block1.elapsed + self.block2.elapsed
    }
}

/// Two-block collision search for one IV.
#[derive(Debug)]
pub struct CollisionFinder {
    config: SearchConfig,
    block1_tables: Block1Tables,
    block2_tables: Block2Tables,
}

impl CollisionFinder {
    /// Validate the configuration and build the mask tables.
    pub fn new(config: SearchConfig) -> CollisionResult<Self> {
        Ok(Self {
            config,
            block1_tables: Block1Tables::new()?,
            block2_tables: Block2Tables::new()?,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run one pipeline seeded with the configured seed.
    pub fn find(&self) -> CollisionResult<SearchReport> {
        self.run_pipeline(self.config.seed, None)
    }

    /// Run `workers` pipelines in parallel, worker `i` seeded with
    /// `seed + i`. Returns the first collision found.
    pub fn find_parallel(&self, workers: usize) -> CollisionResult<SearchReport> {
        let workers = workers.max(1);
        let cancel = Arc::new(AtomicBool::new(false));

        let results: Vec<CollisionResult<SearchReport>> = (0..workers)
            .into_par_iter()
            .map(|worker| {
                let seed = self.config.seed.wrapping_add(worker as u32);
                let result = self.run_pipeline(seed, Some(Arc::clone(&cancel)));
                if result.is_ok() {
                    info!("Worker {} found a collision with seed 0x{:08X}", worker, seed);
                    cancel.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect();

        let mut fallback = None;
        for result in results {
            match result {
                Ok(report) => return Ok(report),
                Err(CollisionError::Cancelled { .. }) if fallback.is_some() => {}
                Err(err @ CollisionError::Cancelled { .. }) => fallback = Some(err),
                Err(err) => {
                    if matches!(fallback, None | Some(CollisionError::Cancelled { .. })) {
                        fallback = Some(err);
                    }
                }
            }
        }
        Err(fallback.unwrap_or(CollisionError::Cancelled {
            stage: Stage::Block1,
            attempts: 0,
        }))
    }

    fn run_pipeline(
        &self,
        seed: u32,
        cancel: Option<Arc<AtomicBool>>,
    ) -> CollisionResult<SearchReport> {
        let config = &self.config;
        let budget = Budget::new(config.max_attempts, cancel);
        let mut rng = Lcg::new(seed);

        let mut block1_search =
            Block1Search::new(config.iv, &self.block1_tables, config.block1_tunnels);
        let (block1, block1_elapsed) = timed(|| block1_search.run(&mut rng, &budget));
        let block1 = block1?;
        let block1_stats = block1_search.stats();
        debug!(
            "First block collision took  : {:.6} sec",
            block1_elapsed.as_secs_f64()
        );
        debug!("Block 1 ihv {:08x?}", block1.ihv.to_words());

        let mut block2_search =
            Block2Search::new(&block1, &self.block2_tables, config.block2_q9_tunnel);
        let (block2, block2_elapsed) = timed(|| block2_search.run(&mut rng, &budget));
        let block2 = block2?;
        let block2_stats = block2_search.stats();
        debug!(
            "Second block collision took : {:.6} sec",
            block2_elapsed.as_secs_f64()
        );

        Ok(SearchReport {
            collision: Collision::assemble(seed, config.iv, &block1, &block2),
            block1: StageReport {
                elapsed: block1_elapsed,
                stats: block1_stats,
            },
            block2: StageReport {
                elapsed: block2_elapsed,
                stats: block2_stats,
            },
        })
    }
}
