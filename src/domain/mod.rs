//! Domain Layer
//!
//! Value objects, ports and events shared by the coordinator and its
//! adapters.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for the two stores and the event sink
//! - **Events** (`events.rs`) - Domain events for audit and observation

pub mod events;
pub mod ports;

pub use events::DomainEvent;
pub use ports::{
    // Port traits
    EventPublisher,
    RankCache,
    RecordStore,
    // Value objects
    Board,
    RankEntry,
    ScoreSheet,
    Student,
    StudentFields,
    StudentId,
    StudentView,
    Subject,
};
