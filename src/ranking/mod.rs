//! Order-Statistics Structures
//!
//! The ranked set behind every leaderboard board.
//!
//! # Complexity
//!
//! | Operation        | Cost            |
//! |------------------|-----------------|
//! | insert / replace | O(log n)        |
//! | remove           | O(log n)        |
//! | rank             | O(log n)        |
//! | range(offset, k) | O(log n + k)    |

#[cfg(test)]
mod proptest;
pub mod skiplist;

pub use skiplist::{RankedSet, MAX_LEVEL};
