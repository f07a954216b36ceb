//! In-Memory Rank Cache
//!
//! One [`RankedSet`] per board behind its own `RwLock`, so writes to one
//! board never block reads of another. Field maps live in a sharded
//! concurrent map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::fault::FaultInjector;
use crate::domain::ports::{Board, RankCache, StudentFields, StudentId};
use crate::error::{Error, Result};
use crate::ranking::RankedSet;

/// Rank cache statistics
#[derive(Debug, Clone, Default)]
pub struct RankCacheStats {
    /// Members per board
    pub board_sizes: HashMap<Board, usize>,
    /// Field maps held
    pub field_maps: usize,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
}

/// Rank cache held entirely in memory
pub struct InMemoryRankCache {
    boards: HashMap<Board, RwLock<RankedSet<StudentId>>>,
    fields: DashMap<StudentId, StudentFields>,
    faults: FaultInjector,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Default for InMemoryRankCache {
    fn default() -> Self {
        Self::with_sets(|_| RankedSet::new())
    }
}

impl InMemoryRankCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with deterministic skip list levels
    pub fn with_seed(seed: u64) -> Self {
        Self::with_sets(|i| RankedSet::with_seed(seed.wrapping_add(i as u64)))
    }

    fn with_sets(make: impl Fn(usize) -> RankedSet<StudentId>) -> Self {
        let boards = Board::ALL
            .iter()
            .enumerate()
            .map(|(i, board)| (*board, RwLock::new(make(i))))
            .collect();
        Self {
            boards,
            fields: DashMap::new(),
            faults: FaultInjector::new("rank cache"),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Fault injection handle
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Members on a board
    pub fn board_len(&self, board: Board) -> usize {
        self.boards.get(&board).map(|b| b.read().len()).unwrap_or(0)
    }

    /// Get cache statistics
    pub fn stats(&self) -> RankCacheStats {
        RankCacheStats {
            board_sizes: self
                .boards
                .iter()
                .map(|(board, set)| (*board, set.read().len()))
                .collect(),
            field_maps: self.fields.len(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn board(&self, board: Board) -> Result<&RwLock<RankedSet<StudentId>>> {
        self.boards
            .get(&board)
            .ok_or_else(|| Error::Internal(format!("board {} not provisioned", board)))
    }

    async fn read_op(&self, operation: &str) -> Result<()> {
        self.faults.check(operation).await?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_op(&self, operation: &str) -> Result<()> {
        self.faults.check(operation).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryRankCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRankCache")
            .field("boards", &self.boards.len())
            .field("field_maps", &self.fields.len())
            .finish()
    }
}

#[async_trait]
impl RankCache for InMemoryRankCache {
    async fn upsert(&self, board: Board, id: &StudentId, score: f64) -> Result<()> {
        self.write_op("upsert").await?;
        if !score.is_finite() {
            return Err(Error::Validation(format!("score {} is not finite", score)));
        }
        self.board(board)?.write().insert(id.clone(), score);
        Ok(())
    }

    async fn remove(&self, board: Board, id: &StudentId) -> Result<bool> {
        self.write_op("remove").await?;
        Ok(self.board(board)?.write().remove(id).is_some())
    }

    async fn score_of(&self, board: Board, id: &StudentId) -> Result<Option<f64>> {
        self.read_op("score_of").await?;
        Ok(self.board(board)?.read().score(id))
    }

    async fn rank_of(&self, board: Board, id: &StudentId) -> Result<Option<usize>> {
        self.read_op("rank_of").await?;
        Ok(self.board(board)?.read().rank(id))
    }

    async fn top_k(&self, board: Board, k: usize) -> Result<Vec<(StudentId, f64)>> {
        self.read_op("top_k").await?;
        Ok(self.board(board)?.read().top(k))
    }

    async fn set_fields(&self, fields: &StudentFields) -> Result<()> {
        self.write_op("set_fields").await?;
        self.fields
            .insert(fields.student_id.clone(), fields.clone());
        Ok(())
    }

    async fn get_fields(&self, id: &StudentId) -> Result<Option<StudentFields>> {
        self.read_op("get_fields").await?;
        Ok(self.fields.get(id).map(|f| f.value().clone()))
    }

    async fn remove_fields(&self, id: &StudentId) -> Result<bool> {
        self.write_op("remove_fields").await?;
        Ok(self.fields.remove(id).is_some())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.faults.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ScoreSheet, Subject};
    use assert_matches::assert_matches;

    fn id(seq: u64) -> StudentId {
        StudentId::from_sequence(seq).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_rank() {
        let cache = InMemoryRankCache::with_seed(1);
        cache.upsert(Board::Math, &id(1), 40.0).await.unwrap();
        cache.upsert(Board::Math, &id(2), 80.0).await.unwrap();

        assert_eq!(cache.rank_of(Board::Math, &id(2)).await.unwrap(), Some(0));
        assert_eq!(cache.rank_of(Board::Math, &id(1)).await.unwrap(), Some(1));
        assert_eq!(cache.rank_of(Board::English, &id(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_without_duplicates() {
        let cache = InMemoryRankCache::with_seed(1);
        cache.upsert(Board::Total, &id(1), 100.0).await.unwrap();
        cache.upsert(Board::Total, &id(1), 200.0).await.unwrap();

        assert_eq!(cache.board_len(Board::Total), 1);
        assert_eq!(
            cache.score_of(Board::Total, &id(1)).await.unwrap(),
            Some(200.0)
        );
    }

    #[tokio::test]
    async fn test_top_k_tie_break() {
        let cache = InMemoryRankCache::with_seed(1);
        cache.upsert(Board::Chinese, &id(3), 70.0).await.unwrap();
        cache.upsert(Board::Chinese, &id(1), 70.0).await.unwrap();
        cache.upsert(Board::Chinese, &id(2), 90.0).await.unwrap();

        let top = cache.top_k(Board::Chinese, 2).await.unwrap();
        assert_eq!(top, vec![(id(2), 90.0), (id(1), 70.0)]);
    }

    #[tokio::test]
    async fn test_boards_are_independent() {
        let cache = InMemoryRankCache::new();
        cache.upsert(Board::Math, &id(1), 10.0).await.unwrap();
        assert!(cache.remove(Board::Math, &id(1)).await.unwrap());
        assert!(!cache.remove(Board::English, &id(1)).await.unwrap());
        assert_eq!(cache.stats().board_sizes[&Board::Math], 0);
    }

    #[tokio::test]
    async fn test_field_maps() {
        let cache = InMemoryRankCache::new();
        let scores: ScoreSheet = Subject::ALL.iter().map(|s| (*s, 1.0)).collect();
        let fields = StudentFields {
            student_id: id(5),
            name: "Dana".to_string(),
            scores,
        };

        assert_eq!(cache.get_fields(&id(5)).await.unwrap(), None);
        cache.set_fields(&fields).await.unwrap();
        assert_eq!(cache.get_fields(&id(5)).await.unwrap(), Some(fields));
        assert!(cache.remove_fields(&id(5)).await.unwrap());
        assert_eq!(cache.get_fields(&id(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_non_finite_scores() {
        let cache = InMemoryRankCache::new();
        assert_matches!(
            cache.upsert(Board::Math, &id(1), f64::NAN).await,
            Err(Error::Validation(_))
        );
    }

    #[tokio::test]
    async fn test_unavailable_cache() {
        let cache = InMemoryRankCache::new();
        cache.faults().set_available(false);
        assert_matches!(
            cache.top_k(Board::Math, 10).await,
            Err(Error::StoreUnavailable(_))
        );
        assert!(!cache.health_check().await.unwrap());
    }
}
