//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │       RecordStore │ RankCache │ EventPublisher            │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryRecordStore │ FileRecordStore │ InMemoryRankCache │ │
//! │  │ TimeoutRecordStore  │ TimeoutRankCache                    │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector           │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod event_publisher;
mod fault;
mod file_store;
mod memory_cache;
mod memory_store;
mod timeout;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use fault::FaultInjector;
pub use file_store::FileRecordStore;
pub use memory_cache::{InMemoryRankCache, RankCacheStats};
pub use memory_store::{InMemoryRecordStore, StoreSnapshot};
pub use timeout::{TimeoutRankCache, TimeoutRecordStore};
