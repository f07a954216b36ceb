//! Ranked Set - Span-Indexed Skip List
//!
//! Ordered multiset of `(member, score)` pairs supporting O(log n) insert,
//! remove, rank and rank-offset lookup.
//!
//! # Ordering
//!
//! Score descending, then member ascending. Ties therefore resolve the same
//! way regardless of insertion order.
//!
//! # Design
//!
//! - Arena of nodes addressed by index, head links kept separately
//! - Every forward link carries a `span`: how many level-0 steps it skips.
//!   Summing spans along a search path yields the rank.
//! - Auxiliary `member -> score` index gives O(1) membership and lets an
//!   update locate the old node before relinking it

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Maximum tower height
pub const MAX_LEVEL: usize = 32;

/// Probability of promoting a node one more level
const LEVEL_PROBABILITY: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Link {
    /// Next node at this level, `None` past the tail
    next: Option<usize>,
    /// Level-0 distance to `next` (or to one past the tail)
    span: usize,
}

#[derive(Debug, Clone)]
struct Node<M> {
    member: M,
    score: f64,
    links: Vec<Link>,
}

/// Cursor into the list: `None` is the head sentinel.
type Cursor = Option<usize>;

/// Skip list ordered by score descending, member ascending
pub struct RankedSet<M> {
    /// Node arena; freed slots are recycled through `free`
    nodes: Vec<Node<M>>,
    free: Vec<usize>,
    /// Head sentinel links, one per possible level
    head: [Link; MAX_LEVEL],
    /// Levels currently in use (>= 1)
    level: usize,
    len: usize,
    /// member -> score
    index: HashMap<M, f64>,
    rng: StdRng,
}

impl<M> std::fmt::Debug for RankedSet<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankedSet")
            .field("len", &self.len)
            .field("level", &self.level)
            .field("arena", &self.nodes.len())
            .finish()
    }
}

impl<M: Ord + Hash + Clone> Default for RankedSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Ord + Hash + Clone> RankedSet<M> {
    /// Create an empty set with an entropy-seeded level generator
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty set with a deterministic level generator
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: [Link::default(); MAX_LEVEL],
            level: 1,
            len: 0,
            index: HashMap::new(),
            rng,
        }
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current score of a member
    pub fn score(&self, member: &M) -> Option<f64> {
        self.index.get(member).copied()
    }

    /// Check if a member is present
    pub fn contains(&self, member: &M) -> bool {
        self.index.contains_key(member)
    }

    /// Insert or replace a member's score, returning the previous score.
    ///
    /// Re-inserting an identical score leaves the structure untouched.
    /// `-0.0` is stored as `0.0`.
    pub fn insert(&mut self, member: M, score: f64) -> Option<f64> {
        let score = score + 0.0;
        if let Some(&old) = self.index.get(&member) {
            if old.total_cmp(&score) == Ordering::Equal {
                return Some(old);
            }
            self.unlink(&member, old);
        }
        self.link(member.clone(), score);
        self.index.insert(member, score)
    }

    /// Remove a member, returning its score
    pub fn remove(&mut self, member: &M) -> Option<f64> {
        let score = self.index.remove(member)?;
        self.unlink(member, score);
        Some(score)
    }

    /// 0-based position of a member, `None` if absent
    pub fn rank(&self, member: &M) -> Option<usize> {
        let score = self.score(member)?;
        let mut traversed = 0;
        let mut x: Cursor = None;

        for i in (0..self.level).rev() {
            while let Some(next) = self.links(x)[i].next {
                if self.cmp_node(next, score, member) == Ordering::Greater {
                    break;
                }
                traversed += self.links(x)[i].span;
                x = Some(next);
            }
            if let Some(found) = x {
                if self.nodes[found].member == *member {
                    return Some(traversed - 1);
                }
            }
        }
        None
    }

    /// Up to `limit` members starting at 0-based position `offset`
    pub fn range(&self, offset: usize, limit: usize) -> Vec<(M, f64)> {
        if limit == 0 || offset >= self.len {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(limit.min(self.len - offset));
        let mut cursor = self.node_at(offset);
        while let Some(idx) = cursor {
            if out.len() == limit {
                break;
            }
            let node = &self.nodes[idx];
            out.push((node.member.clone(), node.score));
            cursor = node.links[0].next;
        }
        out
    }

    /// Up to `k` highest-ranked members
    pub fn top(&self, k: usize) -> Vec<(M, f64)> {
        self.range(0, k)
    }

    /// Iterate members in rank order
    pub fn iter(&self) -> impl Iterator<Item = (&M, f64)> + '_ {
        let mut cursor = self.head[0].next;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let node = &self.nodes[idx];
            cursor = node.links[0].next;
            Some((&node.member, node.score))
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn links(&self, at: Cursor) -> &[Link] {
        match at {
            None => &self.head,
            Some(idx) => &self.nodes[idx].links,
        }
    }

    fn links_mut(&mut self, at: Cursor) -> &mut [Link] {
        match at {
            None => &mut self.head,
            Some(idx) => &mut self.nodes[idx].links,
        }
    }

    /// Order of node `idx` relative to the key `(score, member)`.
    fn cmp_node(&self, idx: usize, score: f64, member: &M) -> Ordering {
        let node = &self.nodes[idx];
        score
            .total_cmp(&node.score)
            .then_with(|| node.member.cmp(member))
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen::<f64>() < LEVEL_PROBABILITY {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, node: Node<M>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Node at 0-based position `rank`.
    fn node_at(&self, rank: usize) -> Cursor {
        let target = rank + 1;
        let mut traversed = 0;
        let mut x: Cursor = None;

        for i in (0..self.level).rev() {
            while let Some(next) = self.links(x)[i].next {
                let span = self.links(x)[i].span;
                if traversed + span > target {
                    break;
                }
                traversed += span;
                x = Some(next);
            }
            if traversed == target {
                return x;
            }
        }
        None
    }

    fn link(&mut self, member: M, score: f64) {
        let mut update: [Cursor; MAX_LEVEL] = [None; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut x: Cursor = None;

        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.links(x)[i].next {
                if self.cmp_node(next, score, &member) != Ordering::Less {
                    break;
                }
                rank[i] += self.links(x)[i].span;
                x = Some(next);
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = None;
                self.head[i].span = self.len;
            }
            self.level = level;
        }

        let idx = self.alloc(Node {
            member,
            score,
            links: vec![Link::default(); level],
        });

        for i in 0..level {
            let prev = self.links(update[i])[i];
            let offset = rank[0] - rank[i];
            self.nodes[idx].links[i] = Link {
                next: prev.next,
                span: prev.span - offset,
            };
            self.links_mut(update[i])[i] = Link {
                next: Some(idx),
                span: offset + 1,
            };
        }
        for (i, at) in update.iter().enumerate().take(self.level).skip(level) {
            self.links_mut(*at)[i].span += 1;
        }

        self.len += 1;
    }

    fn unlink(&mut self, member: &M, score: f64) -> bool {
        let mut update: [Cursor; MAX_LEVEL] = [None; MAX_LEVEL];
        let mut x: Cursor = None;

        for i in (0..self.level).rev() {
            while let Some(next) = self.links(x)[i].next {
                if self.cmp_node(next, score, member) != Ordering::Less {
                    break;
                }
                x = Some(next);
            }
            update[i] = x;
        }

        let target = match self.links(x)[0].next {
            Some(idx) if self.nodes[idx].member == *member => idx,
            _ => return false,
        };

        for (i, at) in update.iter().enumerate().take(self.level) {
            let prev = self.links(*at)[i];
            if prev.next == Some(target) {
                let skipped = self.nodes[target].links[i];
                self.links_mut(*at)[i] = Link {
                    next: skipped.next,
                    span: prev.span + skipped.span - 1,
                };
            } else {
                self.links_mut(*at)[i].span -= 1;
            }
        }

        while self.level > 1 && self.head[self.level - 1].next.is_none() {
            self.level -= 1;
        }

        self.nodes[target].links.clear();
        self.free.push(target);
        self.len -= 1;
        true
    }

    /// Verify link order and span bookkeeping against a level-0 walk.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let mut position = HashMap::new();
        let mut cursor = self.head[0].next;
        let mut rank = 0;
        let mut prev: Option<usize> = None;
        while let Some(idx) = cursor {
            rank += 1;
            if let Some(p) = prev {
                let node = &self.nodes[idx];
                assert_eq!(
                    self.cmp_node(p, node.score, &node.member),
                    Ordering::Less,
                    "level-0 order violated"
                );
            }
            position.insert(idx, rank);
            prev = Some(idx);
            cursor = self.nodes[idx].links[0].next;
        }
        assert_eq!(rank, self.len);
        assert_eq!(self.index.len(), self.len);

        for i in 0..self.level {
            let mut x: Cursor = None;
            loop {
                let from = x.map(|idx| position[&idx]).unwrap_or(0);
                let link = self.links(x)[i];
                match link.next {
                    Some(next) => {
                        assert_eq!(link.span, position[&next] - from, "span at level {}", i);
                        x = Some(next);
                    }
                    None => {
                        assert_eq!(link.span, self.len - from, "tail span at level {}", i);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(entries: &[(&str, f64)]) -> RankedSet<String> {
        let mut set = RankedSet::with_seed(7);
        for (member, score) in entries {
            set.insert(member.to_string(), *score);
        }
        set
    }

    #[test]
    fn test_empty_set() {
        let set: RankedSet<String> = RankedSet::new();
        assert!(set.is_empty());
        assert_eq!(set.rank(&"a".to_string()), None);
        assert!(set.top(5).is_empty());
    }

    #[test]
    fn test_descending_order() {
        let set = set_with(&[("a", 10.0), ("b", 30.0), ("c", 20.0)]);
        let top: Vec<_> = set.top(3).into_iter().map(|(m, _)| m).collect();
        assert_eq!(top, vec!["b", "c", "a"]);
        assert_eq!(set.rank(&"b".to_string()), Some(0));
        assert_eq!(set.rank(&"a".to_string()), Some(2));
        set.check_invariants();
    }

    #[test]
    fn test_ties_break_by_member() {
        let forward = set_with(&[("R2", 50.0), ("R1", 50.0), ("R3", 50.0)]);
        let backward = set_with(&[("R3", 50.0), ("R1", 50.0), ("R2", 50.0)]);
        let expected = vec!["R1".to_string(), "R2".to_string(), "R3".to_string()];

        let a: Vec<_> = forward.top(3).into_iter().map(|(m, _)| m).collect();
        let b: Vec<_> = backward.top(3).into_iter().map(|(m, _)| m).collect();
        assert_eq!(a, expected);
        assert_eq!(b, expected);
    }

    #[test]
    fn test_signed_zeros_tie() {
        let set = set_with(&[("R1", -0.0), ("R2", 0.0), ("R0", 5.0)]);
        let top: Vec<_> = set.top(3).into_iter().map(|(m, _)| m).collect();
        assert_eq!(top, vec!["R0", "R1", "R2"]);
        assert_eq!(set.rank(&"R1".to_string()), Some(1));
        assert!(set.score(&"R1".to_string()).unwrap().is_sign_positive());
        set.check_invariants();
    }

    #[test]
    fn test_insert_replaces() {
        let mut set = set_with(&[("a", 10.0), ("b", 20.0)]);
        assert_eq!(set.insert("a".to_string(), 30.0), Some(10.0));
        assert_eq!(set.len(), 2);
        assert_eq!(set.rank(&"a".to_string()), Some(0));
        assert_eq!(set.score(&"a".to_string()), Some(30.0));
        set.check_invariants();
    }

    #[test]
    fn test_insert_same_score_is_idempotent() {
        let mut set = set_with(&[("a", 10.0), ("b", 20.0)]);
        assert_eq!(set.insert("a".to_string(), 10.0), Some(10.0));
        assert_eq!(set.len(), 2);
        assert_eq!(set.rank(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_remove() {
        let mut set = set_with(&[("a", 10.0), ("b", 20.0), ("c", 30.0)]);
        assert_eq!(set.remove(&"b".to_string()), Some(20.0));
        assert_eq!(set.remove(&"b".to_string()), None);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rank(&"a".to_string()), Some(1));
        set.check_invariants();
    }

    #[test]
    fn test_range_offset() {
        let set = set_with(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        let page: Vec<_> = set.range(1, 2).into_iter().map(|(m, _)| m).collect();
        assert_eq!(page, vec!["c", "b"]);
        assert!(set.range(4, 2).is_empty());
        assert_eq!(set.range(3, 10).len(), 1);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut set = RankedSet::with_seed(1);
        for round in 0..3 {
            for i in 0..100 {
                set.insert(format!("m{:03}", i), (i * (round + 1)) as f64);
            }
            for i in 0..100 {
                set.remove(&format!("m{:03}", i));
            }
        }
        assert!(set.is_empty());
        assert!(set.nodes.len() <= 100);
        set.check_invariants();
    }

    #[test]
    fn test_large_set_ranks() {
        let mut set = RankedSet::with_seed(42);
        for i in 0..1000u32 {
            set.insert(i, f64::from(i % 97));
        }
        set.check_invariants();
        for (position, (member, _)) in set.top(1000).iter().enumerate() {
            assert_eq!(set.rank(member), Some(position));
        }
    }
}
