//! File-Backed Record Store
//!
//! Keeps records in an [`InMemoryRecordStore`] and persists a JSON snapshot
//! after every mutation. The snapshot is written to a temporary file and
//! renamed over the previous one, so a crash never leaves a torn file.
//!
//! A mutation is committed only once its snapshot is on disk. If the write
//! fails the in-memory change is rolled back and the caller sees
//! `StoreUnavailable`. Each mutation runs on its own task, so a caller that
//! gives up waiting never leaves memory and disk out of step.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::memory_store::{InMemoryRecordStore, StoreSnapshot};
use crate::domain::ports::{RecordStore, ScoreSheet, Student, StudentId};
use crate::error::{Error, Result};

/// Record store persisted to a JSON file
#[derive(Debug)]
pub struct FileRecordStore {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    memory: InMemoryRecordStore,
    /// Serializes mutate-then-persist so snapshots land in commit order
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// Open a store, loading the snapshot at `path` if it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreSnapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(Error::Io(e)),
        };

        info!(
            path = %path.display(),
            students = snapshot.students.len(),
            "Opened record store"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                memory: InMemoryRecordStore::from_snapshot(snapshot),
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Run a mutation to completion even if the caller stops polling.
    async fn commit<T, F, Fut>(&self, mutation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let task = tokio::spawn(mutation(Arc::clone(&self.shared)));
        task.await
            .map_err(|e| Error::Internal(format!("record store task failed: {}", e)))?
    }
}

impl Shared {
    async fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.memory.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");

        let written = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        written.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to persist snapshot");
            Error::StoreUnavailable(format!("persist {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Snapshot persisted");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn next_sequence(&self, name: &str) -> Result<u64> {
        let name = name.to_string();
        self.commit(|shared| async move {
            let _guard = shared.write_lock.lock().await;
            let value = shared.memory.next_sequence(&name).await?;
            // A failed persist burns the value; uniqueness still holds.
            shared.persist().await?;
            Ok(value)
        })
        .await
    }

    async fn create(&self, student: &Student) -> Result<()> {
        let student = student.clone();
        self.commit(|shared| async move {
            let _guard = shared.write_lock.lock().await;
            shared.memory.create(&student).await?;
            if let Err(e) = shared.persist().await {
                shared.memory.remove_record(&student.student_id);
                return Err(e);
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &StudentId) -> Result<Student> {
        self.shared.memory.find_by_id(id).await
    }

    async fn update_scores(&self, id: &StudentId, scores: &ScoreSheet, total: f64) -> Result<()> {
        let id = id.clone();
        let scores = scores.clone();
        self.commit(|shared| async move {
            let _guard = shared.write_lock.lock().await;
            let previous = shared.memory.replace_scores(&id, &scores, total)?;
            if let Err(e) = shared.persist().await {
                shared.memory.restore(previous);
                return Err(e);
            }
            Ok(())
        })
        .await
    }

    async fn find_all(&self) -> Result<Vec<Student>> {
        self.shared.memory.find_all().await
    }

    async fn health_check(&self) -> Result<bool> {
        let dir = match self.shared.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(tokio::fs::metadata(dir).await.is_ok())
    }
}
