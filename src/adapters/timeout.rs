//! Timeout Decorators
//!
//! Wrap any store port so every call is bounded. An elapsed call fails with
//! `Error::Timeout`, which classifies as unavailable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::ports::{
    Board, RankCache, RecordStore, ScoreSheet, Student, StudentFields, StudentId,
};
use crate::error::{Error, Result};

async fn bounded<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = after.as_millis() as u64, "Store call timed out");
            Err(Error::timeout(operation, after))
        }
    }
}

/// Record store with a per-call deadline
pub struct TimeoutRecordStore {
    inner: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl TimeoutRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl RecordStore for TimeoutRecordStore {
    async fn next_sequence(&self, name: &str) -> Result<u64> {
        bounded("next_sequence", self.timeout, self.inner.next_sequence(name)).await
    }

    async fn create(&self, student: &Student) -> Result<()> {
        bounded("create", self.timeout, self.inner.create(student)).await
    }

    async fn find_by_id(&self, id: &StudentId) -> Result<Student> {
        bounded("find_by_id", self.timeout, self.inner.find_by_id(id)).await
    }

    async fn update_scores(&self, id: &StudentId, scores: &ScoreSheet, total: f64) -> Result<()> {
        bounded(
            "update_scores",
            self.timeout,
            self.inner.update_scores(id, scores, total),
        )
        .await
    }

    async fn find_all(&self) -> Result<Vec<Student>> {
        bounded("find_all", self.timeout, self.inner.find_all()).await
    }

    async fn health_check(&self) -> Result<bool> {
        bounded("record health_check", self.timeout, self.inner.health_check()).await
    }
}

/// Rank cache with a per-call deadline
pub struct TimeoutRankCache {
    inner: Arc<dyn RankCache>,
    timeout: Duration,
}

impl TimeoutRankCache {
    pub fn new(inner: Arc<dyn RankCache>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl RankCache for TimeoutRankCache {
    async fn upsert(&self, board: Board, id: &StudentId, score: f64) -> Result<()> {
        bounded("cache upsert", self.timeout, self.inner.upsert(board, id, score)).await
    }

    async fn remove(&self, board: Board, id: &StudentId) -> Result<bool> {
        bounded("cache remove", self.timeout, self.inner.remove(board, id)).await
    }

    async fn score_of(&self, board: Board, id: &StudentId) -> Result<Option<f64>> {
        bounded("cache score_of", self.timeout, self.inner.score_of(board, id)).await
    }

    async fn rank_of(&self, board: Board, id: &StudentId) -> Result<Option<usize>> {
        bounded("cache rank_of", self.timeout, self.inner.rank_of(board, id)).await
    }

    async fn top_k(&self, board: Board, k: usize) -> Result<Vec<(StudentId, f64)>> {
        bounded("cache top_k", self.timeout, self.inner.top_k(board, k)).await
    }

    async fn set_fields(&self, fields: &StudentFields) -> Result<()> {
        bounded("cache set_fields", self.timeout, self.inner.set_fields(fields)).await
    }

    async fn get_fields(&self, id: &StudentId) -> Result<Option<StudentFields>> {
        bounded("cache get_fields", self.timeout, self.inner.get_fields(id)).await
    }

    async fn remove_fields(&self, id: &StudentId) -> Result<bool> {
        bounded("cache remove_fields", self.timeout, self.inner.remove_fields(id)).await
    }

    async fn health_check(&self) -> Result<bool> {
        bounded("cache health_check", self.timeout, self.inner.health_check()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryRankCache, InMemoryRecordStore};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let memory = Arc::new(InMemoryRecordStore::new());
        memory.faults().set_latency(Duration::from_millis(200));
        let store = TimeoutRecordStore::new(memory, Duration::from_millis(20));

        let result = store.next_sequence("student_id").await;
        assert_matches!(result, Err(Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_fast_store_passes_through() {
        let store = TimeoutRecordStore::new(
            Arc::new(InMemoryRecordStore::new()),
            Duration::from_secs(1),
        );
        assert_eq!(store.next_sequence("student_id").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_slow_cache_times_out() {
        let memory = Arc::new(InMemoryRankCache::new());
        memory.faults().set_latency(Duration::from_millis(200));
        let cache = TimeoutRankCache::new(memory, Duration::from_millis(20));

        assert_matches!(
            cache.top_k(Board::Total, 3).await,
            Err(Error::Timeout { .. })
        );
    }

    #[test]
    fn test_health_check_passes_through() {
        let memory = Arc::new(InMemoryRecordStore::new());
        let store = TimeoutRecordStore::new(memory.clone(), Duration::from_millis(50));

        let healthy = tokio_test::assert_ok!(tokio_test::block_on(store.health_check()));
        assert!(healthy);

        memory.faults().set_available(false);
        assert!(!tokio_test::block_on(store.health_check()).unwrap());
    }
}
