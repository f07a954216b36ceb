//! In-Memory Record Store
//!
//! Durable-store adapter backed by concurrent maps. Sequence counters are
//! incremented under the map's shard lock, so concurrent callers never see
//! the same value.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::fault::FaultInjector;
use crate::domain::ports::{RecordStore, ScoreSheet, Student, StudentId};
use crate::error::{Error, Result};

/// Point-in-time copy of a record store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub students: Vec<Student>,
}

/// Record store held entirely in memory
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: DashMap<StudentId, Student>,
    counters: DashMap<String, u64>,
    faults: FaultInjector,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            counters: DashMap::new(),
            faults: FaultInjector::new("record store"),
        }
    }
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for (name, value) in snapshot.counters {
            store.counters.insert(name, value);
        }
        for student in snapshot.students {
            store.records.insert(student.student_id.clone(), student);
        }
        store
    }

    /// Copy the current state
    pub fn snapshot(&self) -> StoreSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let mut students: Vec<Student> = self.records.iter().map(|e| e.value().clone()).collect();
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        StoreSnapshot { counters, students }
    }

    /// Fault injection handle
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn remove_record(&self, id: &StudentId) -> Option<Student> {
        self.records.remove(id).map(|(_, s)| s)
    }

    /// Replace scores, returning the record as it was before.
    pub(crate) fn replace_scores(
        &self,
        id: &StudentId,
        scores: &ScoreSheet,
        total: f64,
    ) -> Result<Student> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let previous = record.clone();
        record.scores = scores.clone();
        record.score_total = total;
        Ok(previous)
    }

    pub(crate) fn restore(&self, student: Student) {
        self.records.insert(student.student_id.clone(), student);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn next_sequence(&self, name: &str) -> Result<u64> {
        self.faults.check("next_sequence").await?;

        let mut counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn create(&self, student: &Student) -> Result<()> {
        self.faults.check("create").await?;

        match self.records.entry(student.student_id.clone()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(student.student_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(student.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: &StudentId) -> Result<Student> {
        self.faults.check("find_by_id").await?;

        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn update_scores(&self, id: &StudentId, scores: &ScoreSheet, total: f64) -> Result<()> {
        self.faults.check("update_scores").await?;

        self.replace_scores(id, scores, total).map(|_| ())
    }

    async fn find_all(&self) -> Result<Vec<Student>> {
        self.faults.check("find_all").await?;

        Ok(self.snapshot().students)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.faults.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Subject;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn student(seq: u64, name: &str) -> Student {
        let scores: ScoreSheet = Subject::ALL.iter().map(|s| (*s, 50.0)).collect();
        Student::new(StudentId::from_sequence(seq).unwrap(), name, scores)
    }

    #[tokio::test]
    async fn test_sequences_are_independent() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.next_sequence("student_id").await.unwrap(), 1);
        assert_eq!(store.next_sequence("student_id").await.unwrap(), 2);
        assert_eq!(store.next_sequence("other").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sequences_are_unique() {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    seen.push(store.next_sequence("student_id").await.unwrap());
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all.last(), Some(&800));
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryRecordStore::new();
        let alice = student(1, "Alice");
        store.create(&alice).await.unwrap();

        let found = store.find_by_id(&alice.student_id).await.unwrap();
        assert_eq!(found, alice);

        assert_matches!(store.create(&alice).await, Err(Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        let id = StudentId::from_sequence(9).unwrap();
        assert_matches!(store.find_by_id(&id).await, Err(Error::NotFound(_)));
        assert_matches!(
            store.update_scores(&id, &ScoreSheet::new(), 0.0).await,
            Err(Error::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_update_scores_replaces_map() {
        let store = InMemoryRecordStore::new();
        let alice = student(1, "Alice");
        store.create(&alice).await.unwrap();

        let mut scores = alice.scores.clone();
        scores.set(Subject::Math, 90.0);
        store
            .update_scores(&alice.student_id, &scores, scores.total())
            .await
            .unwrap();

        let found = store.find_by_id(&alice.student_id).await.unwrap();
        assert_eq!(found.scores.get(Subject::Math), Some(90.0));
        assert_eq!(found.score_total, 190.0);
    }

    #[tokio::test]
    async fn test_find_all_sorted() {
        let store = InMemoryRecordStore::new();
        store.create(&student(3, "C")).await.unwrap();
        store.create(&student(1, "A")).await.unwrap();
        store.create(&student(2, "B")).await.unwrap();

        let names: Vec<String> = store
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryRecordStore::new();
        store.faults().set_available(false);
        assert_matches!(
            store.next_sequence("student_id").await,
            Err(Error::StoreUnavailable(_))
        );
        assert!(!store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let store = InMemoryRecordStore::new();
        store.next_sequence("student_id").await.unwrap();
        store.create(&student(1, "Alice")).await.unwrap();

        let restored = InMemoryRecordStore::from_snapshot(store.snapshot());
        assert_eq!(restored.snapshot(), store.snapshot());
        assert_eq!(restored.next_sequence("student_id").await.unwrap(), 2);
    }
}
