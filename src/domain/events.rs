//! Domain Events
//!
//! Immutable records of things that happened to students and to the
//! ranking cache. Published through the `EventPublisher` port for audit
//! logging and for tests that observe cache behaviour.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::StudentId;

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Student Events
    // =========================================================================
    /// A student was allocated an identifier and persisted.
    StudentCreated {
        student_id: String,
        name: String,
        score_total: f64,
        timestamp: DateTime<Utc>,
    },

    /// Scores were persisted for an existing student.
    ScoresUpdated {
        student_id: String,
        subjects: Vec<String>,
        score_total: f64,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Cache Events
    // =========================================================================
    /// A cache miss was resolved from the durable store.
    CacheRepopulated {
        student_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Cache write-through failed after a successful durable write.
    CacheWriteDegraded {
        student_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A student was removed from the cache.
    StudentEvicted {
        student_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::StudentCreated { timestamp, .. } => *timestamp,
            DomainEvent::ScoresUpdated { timestamp, .. } => *timestamp,
            DomainEvent::CacheRepopulated { timestamp, .. } => *timestamp,
            DomainEvent::CacheWriteDegraded { timestamp, .. } => *timestamp,
            DomainEvent::StudentEvicted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::StudentCreated { .. } => "StudentCreated",
            DomainEvent::ScoresUpdated { .. } => "ScoresUpdated",
            DomainEvent::CacheRepopulated { .. } => "CacheRepopulated",
            DomainEvent::CacheWriteDegraded { .. } => "CacheWriteDegraded",
            DomainEvent::StudentEvicted { .. } => "StudentEvicted",
        }
    }

    /// Get the student ID the event concerns.
    pub fn student_id(&self) -> &str {
        match self {
            DomainEvent::StudentCreated { student_id, .. }
            | DomainEvent::ScoresUpdated { student_id, .. }
            | DomainEvent::CacheRepopulated { student_id, .. }
            | DomainEvent::CacheWriteDegraded { student_id, .. }
            | DomainEvent::StudentEvicted { student_id, .. } => student_id,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn student_created(id: &StudentId, name: impl Into<String>, score_total: f64) -> Self {
        DomainEvent::StudentCreated {
            student_id: id.to_string(),
            name: name.into(),
            score_total,
            timestamp: Utc::now(),
        }
    }

    pub fn scores_updated(id: &StudentId, subjects: Vec<String>, score_total: f64) -> Self {
        DomainEvent::ScoresUpdated {
            student_id: id.to_string(),
            subjects,
            score_total,
            timestamp: Utc::now(),
        }
    }

    pub fn cache_repopulated(id: &StudentId) -> Self {
        DomainEvent::CacheRepopulated {
            student_id: id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn cache_write_degraded(id: &StudentId, reason: impl Into<String>) -> Self {
        DomainEvent::CacheWriteDegraded {
            student_id: id.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn student_evicted(id: &StudentId) -> Self {
        DomainEvent::StudentEvicted {
            student_id: id.to_string(),
            timestamp: Utc::now(),
        }
    }
}
