//! Identifier Allocator
//!
//! Turns the durable store's atomic counter into student identifiers.
//! Identifiers only ever come from the durable counter; a failed increment
//! fails the allocation.

use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::ports::{RecordStore, StudentId};
use crate::error::{Error, ErrorKind, Result};

/// Allocates unique, monotonically increasing student identifiers
pub struct IdAllocator {
    store: Arc<dyn RecordStore>,
    sequence: String,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn RecordStore>, sequence: impl Into<String>) -> Self {
        Self {
            store,
            sequence: sequence.into(),
        }
    }

    /// Name of the durable counter
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Allocate the next identifier.
    pub async fn allocate(&self) -> Result<StudentId> {
        let value = self
            .store
            .next_sequence(&self.sequence)
            .await
            .map_err(|e| {
                error!(sequence = %self.sequence, error = %e, "Sequence allocation failed");
                match e.kind() {
                    ErrorKind::Unavailable => e,
                    _ => Error::StoreUnavailable(format!("sequence {}: {}", self.sequence, e)),
                }
            })?;

        let id = StudentId::from_sequence(value)?;
        debug!(sequence = %self.sequence, student_id = %id, "Allocated identifier");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryRecordStore;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_allocates_formatted_ids() {
        let allocator = IdAllocator::new(Arc::new(InMemoryRecordStore::new()), "student_id");
        assert_eq!(allocator.allocate().await.unwrap().as_str(), "R0000000001");
        assert_eq!(allocator.allocate().await.unwrap().as_str(), "R0000000002");
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.faults().set_available(false);
        let allocator = IdAllocator::new(store, "student_id");

        assert_matches!(allocator.allocate().await, Err(Error::StoreUnavailable(_)));
    }
}
