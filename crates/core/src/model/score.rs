use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("score must be between 0 and 100, got {0}")]
    OutOfRange(u32),

    #[error("an assessment needs at least one question")]
    NoQuestions,

    #[error("correct answers ({correct}) exceed total questions ({total})")]
    TooManyCorrect { correct: u32, total: u32 },
}

/// Percentage score of an assessment, `0..=100`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Score(u8);

impl Score {
    /// Default pass mark for lesson quizzes.
    pub const PASS_THRESHOLD: Score = Score(80);
    pub const ZERO: Score = Score(0);
    pub const PERFECT: Score = Score(100);

    /// # Errors
    ///
    /// Returns `ScoreError::OutOfRange` above 100.
    pub fn new(percent: u32) -> Result<Self, ScoreError> {
        u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .map(Self)
            .ok_or(ScoreError::OutOfRange(percent))
    }

    /// Percentage of `correct` out of `total`, rounded half up.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::NoQuestions` when `total` is zero and
    /// `ScoreError::TooManyCorrect` when `correct > total`.
    pub fn from_answers(correct: u32, total: u32) -> Result<Self, ScoreError> {
        if total == 0 {
            return Err(ScoreError::NoQuestions);
        }
        if correct > total {
            return Err(ScoreError::TooManyCorrect { correct, total });
        }
        let scaled = u64::from(correct) * 100;
        let total = u64::from(total);
        let rounded = (scaled * 2 + total) / (total * 2);
        // rounded <= 100 because correct <= total
        Self::new(u32::try_from(rounded).unwrap_or(100))
    }

    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn passes(self, threshold: Score) -> bool {
        self >= threshold
    }
}

impl TryFrom<u32> for Score {
    type Error = ScoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u32 {
    fn from(value: Score) -> Self {
        u32::from(value.0)
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({}%)", self.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_over_one_hundred() {
        assert_eq!(Score::new(101).unwrap_err(), ScoreError::OutOfRange(101));
        assert_eq!(Score::new(100).unwrap(), Score::PERFECT);
    }

    #[test]
    fn from_answers_rounds_half_up() {
        assert_eq!(Score::from_answers(2, 3).unwrap().percent(), 67);
        assert_eq!(Score::from_answers(1, 8).unwrap().percent(), 13);
        assert_eq!(Score::from_answers(4, 5).unwrap().percent(), 80);
        assert_eq!(Score::from_answers(0, 5).unwrap(), Score::ZERO);
    }

    #[test]
    fn from_answers_validates_inputs() {
        assert_eq!(Score::from_answers(1, 0).unwrap_err(), ScoreError::NoQuestions);
        assert!(matches!(
            Score::from_answers(6, 5),
            Err(ScoreError::TooManyCorrect { correct: 6, total: 5 })
        ));
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(Score::new(80).unwrap().passes(Score::PASS_THRESHOLD));
        assert!(!Score::new(79).unwrap().passes(Score::PASS_THRESHOLD));
    }

    #[test]
    fn serde_uses_plain_number() {
        let json = serde_json::to_string(&Score::new(42).unwrap()).unwrap();
        assert_eq!(json, "42");
        assert!(serde_json::from_str::<Score>("150").is_err());
    }
}
