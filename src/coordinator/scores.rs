//! Initial score generation for new students.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::ports::Subject;

/// Highest score a new student can be assigned
pub const MAX_INITIAL_SCORE: u32 = 100;

/// Source of the initial per-subject scores of a new student
pub trait ScoreSource: Send + Sync {
    fn draw(&self, subject: Subject) -> f64;
}

impl<F> ScoreSource for F
where
    F: Fn(Subject) -> f64 + Send + Sync,
{
    fn draw(&self, subject: Subject) -> f64 {
        self(subject)
    }
}

/// Uniform integer scores in `[0, 100]`
pub struct RandomScores {
    rng: Mutex<StdRng>,
}

impl RandomScores {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence for tests and demos
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomScores {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreSource for RandomScores {
    fn draw(&self, _subject: Subject) -> f64 {
        f64::from(self.rng.lock().gen_range(0..=MAX_INITIAL_SCORE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_scores_in_range() {
        let source = RandomScores::new();
        for _ in 0..1000 {
            let score = source.draw(Subject::Math);
            assert!((0.0..=100.0).contains(&score));
            assert_eq!(score.fract(), 0.0);
        }
    }

    #[test]
    fn test_seeded_scores_repeat() {
        let a = RandomScores::seeded(99);
        let b = RandomScores::seeded(99);
        let draws_a: Vec<f64> = (0..20).map(|_| a.draw(Subject::English)).collect();
        let draws_b: Vec<f64> = (0..20).map(|_| b.draw(Subject::English)).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_closure_source() {
        let source = |subject: Subject| match subject {
            Subject::Math => 40.0,
            _ => 55.0,
        };
        assert_eq!(source.draw(Subject::Math), 40.0);
        assert_eq!(source.draw(Subject::Chinese), 55.0);
    }
}
