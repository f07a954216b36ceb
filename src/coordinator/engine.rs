//! Ranking Cache Coordinator
//!
//! Keeps the rank cache consistent with the durable record store.
//!
//! # Write path
//!
//! ```text
//! request ─▶ lock(student) ─▶ RecordStore (commit) ─▶ RankCache (write-through)
//! ```
//!
//! The durable write is the commit point. A cache failure after it is
//! logged, counted and the student's cache entry is dropped so the next read
//! repopulates it; the request still succeeds.
//!
//! # Read path
//!
//! ```text
//! request ─▶ lock(student) ─▶ RankCache hit? ──yes──▶ answer
//!                                   │ no
//!                                   ▼
//!                             RecordStore ─▶ write-through ─▶ answer
//! ```
//!
//! A student is served from the cache only when its field map and every
//! board agree; anything less is treated as a miss. Students whose last
//! write-through failed are misses until a write-through succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::allocator::IdAllocator;
use super::config::CoordinatorConfig;
use super::locks::StudentLocks;
use super::scores::{RandomScores, ScoreSource};
use crate::adapters::{LoggingEventPublisher, TimeoutRankCache, TimeoutRecordStore};
use crate::domain::events::DomainEvent;
use crate::domain::ports::{
    Board, EventPublisher, RankCache, RankEntry, RecordStore, ScoreSheet, Student, StudentId,
    StudentView, Subject,
};
use crate::error::{Error, ErrorKind, Result};
use crate::metrics::CoordinatorMetrics;

// =============================================================================
// Results
// =============================================================================

/// Outcome of a score update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub student_id: StudentId,
    /// Subjects written, with their new scores
    pub applied: BTreeMap<Subject, f64>,
    /// Keys skipped because they failed validation
    pub rejected: Vec<String>,
    pub scores: ScoreSheet,
    pub score_total: f64,
}

impl UpdateReport {
    /// True when some keys were skipped
    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Reachability of both stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub record_store: bool,
    pub rank_cache: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.record_store && self.rank_cache
    }
}

/// Where a student's current state was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Cache,
    Store,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Orchestrates the record store, the rank cache and identifier allocation
pub struct RankingCoordinator {
    config: CoordinatorConfig,
    records: Arc<dyn RecordStore>,
    cache: Arc<dyn RankCache>,
    allocator: IdAllocator,
    scores: Arc<dyn ScoreSource>,
    locks: StudentLocks,
    /// Students whose cache entry may lag the record store
    stale: DashSet<StudentId>,
    events: Arc<dyn EventPublisher>,
    metrics: Arc<CoordinatorMetrics>,
}

impl RankingCoordinator {
    /// Create a coordinator over the given stores.
    ///
    /// Both stores are wrapped so that every call is bounded by the
    /// configured timeouts.
    pub fn new(
        config: CoordinatorConfig,
        records: Arc<dyn RecordStore>,
        cache: Arc<dyn RankCache>,
    ) -> Result<Self> {
        config.validate()?;

        let records: Arc<dyn RecordStore> =
            Arc::new(TimeoutRecordStore::new(records, config.store_timeout));
        let cache: Arc<dyn RankCache> =
            Arc::new(TimeoutRankCache::new(cache, config.cache_timeout));
        let scores: Arc<dyn ScoreSource> = match config.score_seed {
            Some(seed) => Arc::new(RandomScores::seeded(seed)),
            None => Arc::new(RandomScores::new()),
        };

        Ok(Self {
            allocator: IdAllocator::new(records.clone(), config.sequence_name.clone()),
            locks: StudentLocks::new(config.lock_timeout),
            stale: DashSet::new(),
            events: Arc::new(LoggingEventPublisher::new()),
            metrics: Arc::new(CoordinatorMetrics::new()?),
            records,
            cache,
            scores,
            config,
        })
    }

    /// Replace the initial score source
    pub fn with_score_source(mut self, scores: Arc<dyn ScoreSource>) -> Self {
        self.scores = scores;
        self
    }

    /// Replace the event publisher
    pub fn with_event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Allocate an identifier, draw initial scores, persist and cache.
    #[instrument(skip(self))]
    pub async fn create_student(&self, name: &str) -> Result<StudentId> {
        let started = Instant::now();
        let result = self.create_inner(name).await;
        self.record("create_student", started, &result);
        result
    }

    /// Apply a partial score map. Unknown subjects are rejected, the rest
    /// is applied.
    #[instrument(skip(self, updates), fields(keys = updates.len()))]
    pub async fn update_scores(
        &self,
        student_id: &str,
        updates: &BTreeMap<String, f64>,
    ) -> Result<UpdateReport> {
        let started = Instant::now();
        let result = self.update_inner(student_id, updates).await;
        self.record("update_scores", started, &result);
        result
    }

    /// Leaderboard for a subject or `total`. `count` is the raw caller value.
    #[instrument(skip(self))]
    pub async fn get_rank(&self, subject: &str, count: Option<&str>) -> Result<Vec<RankEntry>> {
        let started = Instant::now();
        let result = self.rank_inner(subject, count).await;
        self.record("get_rank", started, &result);
        result
    }

    /// Hydrate a batch of students with live ranks, sorted by identifier.
    /// Malformed and unknown identifiers are skipped.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn get_students(&self, ids: &[String]) -> Result<Vec<StudentView>> {
        let started = Instant::now();
        let result = self.students_inner(ids).await;
        self.record("get_students", started, &result);
        result
    }

    /// Drop a student from every board and its field map.
    #[instrument(skip(self))]
    pub async fn evict(&self, student_id: &str) -> Result<bool> {
        let id = StudentId::parse(student_id)?;
        let _lease = self.locks.acquire(&id).await?;

        let removed = self.purge(&id).await?;
        if removed {
            self.publish(DomainEvent::student_evicted(&id)).await;
        }
        Ok(removed)
    }

    /// Load every durable record that is not already cached.
    #[instrument(skip(self))]
    pub async fn warm_up(&self) -> Result<usize> {
        let students = self.records.find_all().await?;
        let mut warmed = 0;

        for listed in students {
            let id = listed.student_id;
            let _lease = self.locks.acquire(&id).await?;
            if self.hydrate_from_cache(&id).await?.is_some() {
                continue;
            }
            // Re-read under the lock: the listing may predate an update.
            let student = match self.records.find_by_id(&id).await {
                Ok(student) => student,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if self.write_through(&student, &Board::ALL).await {
                warmed += 1;
            }
        }

        info!(warmed, "Cache warm-up complete");
        Ok(warmed)
    }

    /// Probe both stores
    pub async fn health(&self) -> HealthReport {
        HealthReport {
            record_store: self.records.health_check().await.unwrap_or(false),
            rank_cache: self.cache.health_check().await.unwrap_or(false),
        }
    }

    // =========================================================================
    // Operation bodies
    // =========================================================================

    async fn create_inner(&self, name: &str) -> Result<StudentId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }

        let id = self.allocator.allocate().await?;
        let scores: ScoreSheet = Subject::ALL
            .iter()
            .map(|subject| (*subject, self.scores.draw(*subject)))
            .collect();
        let student = Student::new(id.clone(), name, scores);

        let _lease = self.locks.acquire(&id).await?;
        if let Err(e) = self.records.create(&student).await {
            self.unsettle(&id, &e).await;
            return Err(e);
        }
        self.write_through(&student, &Board::ALL).await;

        info!(student_id = %id, total = student.score_total, "Student created");
        self.publish(DomainEvent::student_created(&id, name, student.score_total))
            .await;
        Ok(id)
    }

    async fn update_inner(
        &self,
        student_id: &str,
        updates: &BTreeMap<String, f64>,
    ) -> Result<UpdateReport> {
        let id = StudentId::parse(student_id)?;

        let mut valid = Vec::new();
        let mut rejected = Vec::new();
        for (key, score) in updates {
            match key.parse::<Subject>() {
                // Adding 0.0 folds -0.0 into 0.0.
                Ok(subject) if score.is_finite() => valid.push((subject, *score + 0.0)),
                Ok(_) => rejected.push(key.clone()),
                Err(_) => rejected.push(key.clone()),
            }
        }
        if !rejected.is_empty() {
            warn!(student_id = %id, rejected = ?rejected, "Rejected score keys");
        }
        if valid.is_empty() {
            return Err(Error::Validation(format!(
                "no valid subject scores (rejected: {})",
                rejected.join(", ")
            )));
        }

        let _lease = self.locks.acquire(&id).await?;
        let (mut student, source) = self.load_for_update(&id).await?;

        let mut applied = BTreeMap::new();
        let mut changed = Vec::new();
        for (subject, score) in valid {
            if student.scores.set(subject, score) != Some(score) {
                changed.push(Board::from(subject));
            }
            applied.insert(subject, score);
        }
        student.score_total = student.scores.total();
        if !student.score_total.is_finite() {
            return Err(Error::Validation(format!(
                "score total for {} is not finite",
                id
            )));
        }

        if let Err(e) = self
            .records
            .update_scores(&id, &student.scores, student.score_total)
            .await
        {
            self.unsettle(&id, &e).await;
            return Err(e);
        }

        let boards = match source {
            Source::Cache => {
                changed.push(Board::Total);
                changed
            }
            Source::Store => Board::ALL.to_vec(),
        };
        self.write_through(&student, &boards).await;

        debug!(student_id = %id, total = student.score_total, "Scores updated");
        self.publish(DomainEvent::scores_updated(
            &id,
            applied.keys().map(|s| s.to_string()).collect(),
            student.score_total,
        ))
        .await;

        Ok(UpdateReport {
            student_id: id,
            applied,
            rejected,
            scores: student.scores,
            score_total: student.score_total,
        })
    }

    async fn rank_inner(&self, subject: &str, count: Option<&str>) -> Result<Vec<RankEntry>> {
        let board: Board = subject.parse()?;
        let k = match count {
            None => self.config.default_rank_count,
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Validation(format!("count must be a non-negative integer, got {:?}", raw))
            })?,
        };

        let top = self.cache.top_k(board, k).await?;
        Ok(top
            .into_iter()
            .enumerate()
            .map(|(i, (student_id, score))| RankEntry {
                student_id,
                score,
                position: i + 1,
            })
            .collect())
    }

    async fn students_inner(&self, ids: &[String]) -> Result<Vec<StudentView>> {
        let mut parsed: Vec<StudentId> = ids
            .iter()
            .filter_map(|raw| match StudentId::parse(raw.trim()) {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed student id");
                    None
                }
            })
            .collect();
        parsed.sort();
        parsed.dedup();

        let views: Vec<Option<StudentView>> = stream::iter(parsed)
            .map(|id| async move { self.view_of(&id).await })
            .buffered(self.config.hydrate_concurrency)
            .try_collect()
            .await?;

        Ok(views.into_iter().flatten().collect())
    }

    // =========================================================================
    // Cache plumbing
    // =========================================================================

    /// One student, hydrated and ranked, under its lock.
    async fn view_of(&self, id: &StudentId) -> Result<Option<StudentView>> {
        let _lease = self.locks.acquire(id).await?;

        let student = match self.hydrate_from_cache(id).await? {
            Some(student) => {
                self.metrics.record_cache_hit();
                student
            }
            None => {
                self.metrics.record_cache_miss();
                match self.records.find_by_id(id).await {
                    Ok(student) => {
                        if self.write_through(&student, &Board::ALL).await {
                            self.metrics.record_repopulation();
                            self.publish(DomainEvent::cache_repopulated(id)).await;
                        }
                        student
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(student_id = %id, "Student not found in either store");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let mut ranks = BTreeMap::new();
        for board in Board::ALL {
            if let Some(rank) = self.cache.rank_of(board, id).await? {
                ranks.insert(board, rank + 1);
            }
        }

        Ok(Some(StudentView {
            student_id: student.student_id,
            name: student.name,
            scores: student.scores,
            score_total: student.score_total,
            ranks,
        }))
    }

    /// Current state for an update: cache when complete, else the store.
    async fn load_for_update(&self, id: &StudentId) -> Result<(Student, Source)> {
        match self.hydrate_from_cache(id).await {
            Ok(Some(student)) => {
                self.metrics.record_cache_hit();
                return Ok((student, Source::Cache));
            }
            Ok(None) => self.metrics.record_cache_miss(),
            Err(e) => {
                warn!(student_id = %id, error = %e, "Cache read failed, loading from record store");
                self.metrics.record_cache_miss();
            }
        }

        let student = self.records.find_by_id(id).await?;
        Ok((student, Source::Store))
    }

    /// Complete cached copy of a student, `None` on any gap or disagreement.
    async fn hydrate_from_cache(&self, id: &StudentId) -> Result<Option<Student>> {
        if self.stale.contains(id) {
            return Ok(None);
        }
        let Some(fields) = self.cache.get_fields(id).await? else {
            return Ok(None);
        };
        if !fields.scores.is_complete() {
            return Ok(None);
        }

        let student = Student::new(fields.student_id, fields.name, fields.scores);
        for board in Board::ALL {
            if self.cache.score_of(board, id).await? != student.score_on(board) {
                return Ok(None);
            }
        }
        Ok(Some(student))
    }

    /// Write boards then the field map. Returns false if the cache refused;
    /// the student is then marked stale and purged best-effort.
    async fn write_through(&self, student: &Student, boards: &[Board]) -> bool {
        let id = &student.student_id;
        let Err(e) = self.write_entries(student, boards).await else {
            self.stale.remove(id);
            return true;
        };

        warn!(student_id = %id, error = %e, "Cache write-through failed");
        self.stale.insert(id.clone());
        self.metrics.record_degraded_write();
        if let Err(purge_err) = self.purge(id).await {
            debug!(student_id = %id, error = %purge_err, "Purge after failed write-through failed");
        }
        self.publish(DomainEvent::cache_write_degraded(id, e.to_string()))
            .await;
        false
    }

    /// A store write failed with an unknown outcome. Stop trusting the
    /// cached copy until the next successful write-through.
    async fn unsettle(&self, id: &StudentId, cause: &Error) {
        if cause.kind() != ErrorKind::Unavailable {
            return;
        }
        warn!(student_id = %id, error = %cause, "Record store outcome unknown, marking cache stale");
        self.stale.insert(id.clone());
        if let Err(purge_err) = self.purge(id).await {
            debug!(student_id = %id, error = %purge_err, "Purge after failed store write failed");
        }
    }

    async fn write_entries(&self, student: &Student, boards: &[Board]) -> Result<()> {
        let id = &student.student_id;
        for board in boards {
            if let Some(score) = student.score_on(*board) {
                self.cache.upsert(*board, id, score).await?;
            }
        }
        self.cache.set_fields(&student.fields()).await
    }

    /// Remove every cache trace of a student. Caller holds the lock.
    async fn purge(&self, id: &StudentId) -> Result<bool> {
        // Field map first: without it the student reads as a miss.
        let mut removed = self.cache.remove_fields(id).await?;
        for board in Board::ALL {
            removed |= self.cache.remove(board, id).await?;
        }
        Ok(removed)
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }

    fn record<T>(&self, operation: &str, started: Instant, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => match e.kind() {
                ErrorKind::Validation => "invalid",
                ErrorKind::NotFound => "not_found",
                ErrorKind::Unavailable => "unavailable",
                ErrorKind::Internal => "error",
            },
        };
        self.metrics
            .record_operation(operation, outcome, started.elapsed());
    }
}
