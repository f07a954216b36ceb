//! Leaderboard - Ranking Cache Coordinator
//!
//! Student score leaderboards backed by a durable record store, with an
//! in-memory rank cache kept consistent by write-through and read-repair.
//!
//! # Architecture
//!
//! ```text
//! HTTP (server) → Coordinator → RecordStore (durable, authoritative)
//!                            ↘ RankCache   (derived, rebuildable)
//! ```
//!
//! Rank queries run in `O(log n)` against one skip list per board, ordered
//! by score descending with ties broken by ascending student identifier.
//!
//! # Modules
//!
//! - [`adapters`] - Store, cache and event adapters implementing domain ports
//! - [`coordinator`] - Allocation, locking and the consistency protocol
//! - [`domain`] - Value objects, ports and events
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics
//! - [`ranking`] - Span-annotated skip list
//! - [`server`] - HTTP/1 JSON surface

pub mod adapters;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ranking;
pub mod server;

// Re-export commonly used types
pub use coordinator::{CoordinatorConfig, RankingCoordinator, UpdateReport};
pub use domain::{Board, RankEntry, Student, StudentId, StudentView, Subject};
pub use error::{Error, Result};
pub use ranking::RankedSet;
