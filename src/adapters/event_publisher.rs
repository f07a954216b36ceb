//! Event Publisher Adapters
//!
//! `EventPublisher` implementations: one that writes events to the tracing
//! pipeline and a bounded in-memory log that tests inspect.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::events::DomainEvent;
use crate::domain::ports::{EventPublisher, StudentId};
use crate::error::Result;

/// Emits each event as a structured log record.
///
/// Degraded cache writes are always logged at `warn`. Student events go to
/// `info` or `debug` depending on the configured level; cache bookkeeping
/// stays at `debug`.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    info_level: bool,
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log student events at `info`
    pub fn info_level() -> Self {
        Self { info_level: true }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        match &event {
            DomainEvent::CacheWriteDegraded {
                student_id, reason, ..
            } => {
                warn!(student_id = %student_id, reason = %reason, "Cache write degraded");
            }
            DomainEvent::StudentCreated {
                student_id,
                score_total,
                ..
            }
            | DomainEvent::ScoresUpdated {
                student_id,
                score_total,
                ..
            } => {
                if self.info_level {
                    info!(event_type = event.event_type(), student_id = %student_id, score_total, "Student event");
                } else {
                    debug!(event_type = event.event_type(), student_id = %student_id, score_total, "Student event");
                }
            }
            DomainEvent::CacheRepopulated { student_id, .. }
            | DomainEvent::StudentEvicted { student_id, .. } => {
                debug!(event_type = event.event_type(), student_id = %student_id, "Cache event");
            }
        }
        Ok(())
    }
}

/// Bounded in-memory event log. The oldest events are dropped first.
#[derive(Debug)]
pub struct InMemoryEventCollector {
    events: Mutex<VecDeque<DomainEvent>>,
    capacity: usize,
}

impl Default for InMemoryEventCollector {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl InMemoryEventCollector {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Events in publication order
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Events whose type name matches, e.g. `"CacheRepopulated"`
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.filtered(|e| e.event_type() == event_type)
    }

    /// Events concerning one student
    pub fn events_for(&self, id: &StudentId) -> Vec<DomainEvent> {
        self.filtered(|e| e.student_id() == id.as_str())
    }

    fn filtered(&self, keep: impl Fn(&DomainEvent) -> bool) -> Vec<DomainEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}
