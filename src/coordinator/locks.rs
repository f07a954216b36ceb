//! Per-Student Lock Table
//!
//! Serializes read-modify-write sequences on one student while leaving
//! different students fully concurrent. Entries are created on demand and
//! dropped again once nobody holds or waits on them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::ports::StudentId;
use crate::error::{Error, Result};

type LockTable = DashMap<StudentId, Arc<Mutex<()>>>;

/// Keyed async mutex table
pub struct StudentLocks {
    table: Arc<LockTable>,
    wait_timeout: Duration,
}

impl StudentLocks {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            wait_timeout,
        }
    }

    /// Wait (bounded) for exclusive access to one student.
    pub async fn acquire(&self, id: &StudentId) -> Result<StudentLease> {
        let mutex = self
            .table
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = match tokio::time::timeout(self.wait_timeout, mutex.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                self.table
                    .remove_if(id, |_, mutex| Arc::strong_count(mutex) == 1);
                return Err(Error::timeout(format!("lock for {}", id), self.wait_timeout));
            }
        };

        Ok(StudentLease {
            guard: Some(guard),
            table: self.table.clone(),
            id: id.clone(),
        })
    }

    /// Students with a live entry (held or awaited)
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Exclusive access to one student until dropped
#[derive(Debug)]
pub struct StudentLease {
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
    id: StudentId,
}

impl StudentLease {
    pub fn student_id(&self) -> &StudentId {
        &self.id
    }
}

impl Drop for StudentLease {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own reference left: nobody holds or waits.
        self.table
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
