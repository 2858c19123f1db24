//! # md5-tunnel
//!
//! MD5 two-block collision search along the differential path of Wang et
//! al., accelerated with Klima's tunnels.
//!
//! ## Modules
//!
//! - **md5**: Compression function, step table and the extended state trace
//! - **mask** / **path**: Tunnel mask tables and differential-path constants
//! - **block1** / **block2**: The two constrained block searches
//! - **search**: Seeded pipelines, budgets and parallel workers
//! - **collision**: Assembled collisions and published fixtures
//! - **report** / **config**: Output files and hex argument parsing
//!
//! ## Security Warning
//!
//! MD5 is cryptographically broken. This crate exists to study why.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use md5_tunnel::{ChainingState, CollisionFinder, SearchConfig};
//!
//! let finder = CollisionFinder::new(SearchConfig::new(0, ChainingState::STANDARD))?;
//! let report = finder.find()?;
//! assert!(report.collision.verify());
//! println!("Colliding hash: {}", report.collision.digest_hex());
//! # Ok::<(), md5_tunnel::CollisionError>(())
//! ```

pub mod bits;
pub mod block1;
pub mod block2;
pub mod collision;
pub mod config;
pub mod error;
pub mod mask;
pub mod md5;
pub mod path;
pub mod report;
pub mod rng;
pub mod search;

// Re-export commonly used items
pub use collision::{Collision, KnownCollision, WANG_COLLISION_0, WANG_COLLISION_1};
pub use config::HexArgs;
pub use error::{CollisionError, CollisionResult, Stage};
pub use md5::{hash as md5, hash_with_iv as md5_with_iv, to_hex as md5_to_hex, ChainingState};
pub use search::{Block1Tunnels, CollisionFinder, SearchConfig, SearchReport};
