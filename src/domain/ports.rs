//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! Value objects shared by every layer, and the traits (ports) the
//! coordinator depends on. Infrastructure adapters implement these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │    RecordStore │ RankCache │ EventPublisher         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  InMemoryRecordStore │ FileRecordStore │ Timeout*  │    │
//! │  │  InMemoryRankCache   │ LoggingEventPublisher       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Tracked subject. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Chinese,
    English,
    Math,
}

impl Subject {
    /// Every tracked subject, in display order.
    pub const ALL: [Subject; 3] = [Subject::Chinese, Subject::English, Subject::Math];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Chinese => "chinese",
            Subject::English => "english",
            Subject::Math => "math",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chinese" => Ok(Subject::Chinese),
            "english" => Ok(Subject::English),
            "math" => Ok(Subject::Math),
            other => Err(Error::UnknownSubject(other.to_string())),
        }
    }
}

/// A ranking board: one per tracked subject plus the synthetic `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Board {
    Chinese,
    English,
    Math,
    Total,
}

impl Board {
    /// Every board, subjects first.
    pub const ALL: [Board; 4] = [Board::Chinese, Board::English, Board::Math, Board::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            Board::Chinese => "chinese",
            Board::English => "english",
            Board::Math => "math",
            Board::Total => "total",
        }
    }

    /// The tracked subject behind this board, `None` for `total`.
    pub fn subject(&self) -> Option<Subject> {
        match self {
            Board::Chinese => Some(Subject::Chinese),
            Board::English => Some(Subject::English),
            Board::Math => Some(Subject::Math),
            Board::Total => None,
        }
    }
}

impl From<Subject> for Board {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::Chinese => Board::Chinese,
            Subject::English => Board::English,
            Subject::Math => Board::Math,
        }
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Board {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "total" => Ok(Board::Total),
            other => other.parse::<Subject>().map(Board::from),
        }
    }
}

/// Student identifier (value object).
///
/// Rendered as `R` followed by the zero-padded 10-digit sequence number.
/// Fixed width keeps lexicographic order equal to allocation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudentId(String);

impl StudentId {
    /// Leading sentinel character.
    pub const PREFIX: char = 'R';
    /// Total rendered width including the prefix.
    pub const WIDTH: usize = 11;

    /// Render a sequence number as an identifier.
    pub fn from_sequence(seq: u64) -> Result<Self> {
        if seq > 9_999_999_999 {
            return Err(Error::Internal(format!(
                "sequence {} exceeds identifier width",
                seq
            )));
        }
        Ok(Self(format!("{}{:010}", Self::PREFIX, seq)))
    }

    /// Parse and validate an externally supplied identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let well_formed = raw.len() == Self::WIDTH
            && chars.next() == Some(Self::PREFIX)
            && chars.all(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(Error::InvalidStudentId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric sequence value behind this identifier.
    pub fn sequence(&self) -> u64 {
        self.0[1..].parse().unwrap_or_default()
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StudentId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<StudentId> for String {
    fn from(id: StudentId) -> Self {
        id.0
    }
}

/// Full per-subject score map of one student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSheet(BTreeMap<Subject, f64>);

impl ScoreSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject: Subject) -> Option<f64> {
        self.0.get(&subject).copied()
    }

    /// Set a score, returning the previous value.
    pub fn set(&mut self, subject: Subject, score: f64) -> Option<f64> {
        self.0.insert(subject, score)
    }

    /// Sum over tracked subjects. Missing subjects count as zero.
    pub fn total(&self) -> f64 {
        Subject::ALL.iter().filter_map(|s| self.get(*s)).sum()
    }

    /// True when every tracked subject has a score.
    pub fn is_complete(&self) -> bool {
        Subject::ALL.iter().all(|s| self.0.contains_key(s))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Subject, f64)> + '_ {
        self.0.iter().map(|(s, v)| (*s, *v))
    }
}

impl FromIterator<(Subject, f64)> for ScoreSheet {
    fn from_iter<I: IntoIterator<Item = (Subject, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Canonical student record as held by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: StudentId,
    pub name: String,
    pub scores: ScoreSheet,
    pub score_total: f64,
}

impl Student {
    /// Build a record with `score_total` derived from `scores`.
    pub fn new(student_id: StudentId, name: impl Into<String>, scores: ScoreSheet) -> Self {
        let score_total = scores.total();
        Self {
            student_id,
            name: name.into(),
            scores,
            score_total,
        }
    }

    /// Score on a board; `total` reads the stored total.
    pub fn score_on(&self, board: Board) -> Option<f64> {
        match board.subject() {
            Some(subject) => self.scores.get(subject),
            None => Some(self.score_total),
        }
    }

    /// Student as a cache field map.
    pub fn fields(&self) -> StudentFields {
        StudentFields {
            student_id: self.student_id.clone(),
            name: self.name.clone(),
            scores: self.scores.clone(),
        }
    }
}

/// Per-student field map held by the rank cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentFields {
    pub student_id: StudentId,
    pub name: String,
    pub scores: ScoreSheet,
}

/// One leaderboard row. `position` is 1-based and computed at query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub student_id: StudentId,
    pub score: f64,
    pub position: usize,
}

/// Hydrated student annotated with live ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentView {
    pub student_id: StudentId,
    pub name: String,
    pub scores: ScoreSheet,
    pub score_total: f64,
    /// 1-based position per board.
    pub ranks: BTreeMap<Board, usize>,
}

// =============================================================================
// Record Store Port
// =============================================================================

/// Port for the durable, authoritative record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Atomically increment the named counter and return the new value.
    async fn next_sequence(&self, name: &str) -> Result<u64>;

    /// Insert a new record. Fails if the identifier already exists.
    async fn create(&self, student: &Student) -> Result<()>;

    /// Fetch a record. Returns `Error::NotFound` when absent.
    async fn find_by_id(&self, id: &StudentId) -> Result<Student>;

    /// Replace the full score map and total of an existing record.
    async fn update_scores(&self, id: &StudentId, scores: &ScoreSheet, total: f64) -> Result<()>;

    /// Every record, in identifier order.
    async fn find_all(&self) -> Result<Vec<Student>>;

    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Rank Cache Port
// =============================================================================

/// Port for the derived ranking cache.
///
/// Positions returned here are 0-based; ordering is score descending, then
/// identifier ascending.
#[async_trait]
pub trait RankCache: Send + Sync {
    /// Insert or replace a member's score on a board.
    async fn upsert(&self, board: Board, id: &StudentId, score: f64) -> Result<()>;

    /// Remove a member from a board. Returns true if it was present.
    async fn remove(&self, board: Board, id: &StudentId) -> Result<bool>;

    /// Current score of a member on a board.
    async fn score_of(&self, board: Board, id: &StudentId) -> Result<Option<f64>>;

    /// 0-based position of a member on a board, `None` when unranked.
    async fn rank_of(&self, board: Board, id: &StudentId) -> Result<Option<usize>>;

    /// Up to `k` members, highest first.
    async fn top_k(&self, board: Board, k: usize) -> Result<Vec<(StudentId, f64)>>;

    /// Store a student's field map.
    async fn set_fields(&self, fields: &StudentFields) -> Result<()>;

    /// Read a student's field map.
    async fn get_fields(&self, id: &StudentId) -> Result<Option<StudentFields>>;

    /// Drop a student's field map. Returns true if it was present.
    async fn remove_fields(&self, id: &StudentId) -> Result<bool>;

    /// Check if the cache is reachable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

use super::events::DomainEvent;

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================
