//! Ranking Coordinator
//!
//! Application layer of the leaderboard. Owns identifier allocation,
//! per-student serialisation and the write-through/read-repair protocol
//! between the durable record store and the rank cache.
//!
//! - [`IdAllocator`]: `R%010d` identifiers from the durable counter
//! - [`StudentLocks`]: keyed async locks, one per student
//! - [`RankingCoordinator`]: create, update, rank and batch-read operations

pub mod allocator;
pub mod config;
pub mod engine;
pub mod locks;
pub mod scores;

pub use allocator::IdAllocator;
pub use config::CoordinatorConfig;
pub use engine::{HealthReport, RankingCoordinator, UpdateReport};
pub use locks::{StudentLease, StudentLocks};
pub use scores::{RandomScores, ScoreSource, MAX_INITIAL_SCORE};
