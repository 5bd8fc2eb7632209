use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::curriculum::Tab;
use crate::model::ids::{LessonId, UserId};
use crate::model::score::{Score, ScoreError};

/// Longest answer text kept in the log.
pub const MAX_ANSWER_CHARS: usize = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question id cannot be empty")]
    EmptyQuestion,

    #[error("answer is too long ({len} chars, max {MAX_ANSWER_CHARS})")]
    AnswerTooLong { len: usize },

    #[error("unknown assessment: {0}")]
    UnknownAssessment(String),
}

/// Which quiz an answer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Assessment {
    PreTest,
    LessonQuiz(LessonId),
    PostTest,
}

impl Assessment {
    #[must_use]
    pub fn tab(self) -> Tab {
        match self {
            Assessment::PreTest => Tab::PreTest,
            Assessment::LessonQuiz(id) => Tab::Lesson(id),
            Assessment::PostTest => Tab::PostTest,
        }
    }
}

impl From<Tab> for Assessment {
    fn from(tab: Tab) -> Self {
        match tab {
            Tab::PreTest => Assessment::PreTest,
            Tab::Lesson(id) => Assessment::LessonQuiz(id),
            Tab::PostTest => Assessment::PostTest,
        }
    }
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tab())
    }
}

impl FromStr for Assessment {
    type Err = AnswerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Tab>()
            .map(Assessment::from)
            .map_err(|_| AnswerError::UnknownAssessment(s.to_owned()))
    }
}

impl TryFrom<String> for Assessment {
    type Error = AnswerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Assessment> for String {
    fn from(value: Assessment) -> Self {
        value.to_string()
    }
}

/// Unvalidated answer submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerDraft {
    pub assessment: Assessment,
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
}

impl AnswerDraft {
    /// Normalize and attach the owner and timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` for a blank question id or an oversized answer.
    pub fn validate(self, user_id: UserId, now: DateTime<Utc>) -> Result<NewAnswer, AnswerError> {
        let question_id = self.question_id.trim().to_owned();
        if question_id.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }
        let answer = self.answer.trim().to_owned();
        let len = answer.chars().count();
        if len > MAX_ANSWER_CHARS {
            return Err(AnswerError::AnswerTooLong { len });
        }
        Ok(NewAnswer {
            user_id,
            assessment: self.assessment,
            question_id,
            answer,
            is_correct: self.is_correct,
            answered_at: now,
        })
    }
}

/// Validated answer waiting for an id from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub user_id: UserId,
    pub assessment: Assessment,
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl NewAnswer {
    #[must_use]
    pub fn assign_id(self, id: i64) -> AnswerLog {
        AnswerLog {
            id,
            user_id: self.user_id,
            assessment: self.assessment,
            question_id: self.question_id,
            answer: self.answer,
            is_correct: self.is_correct,
            answered_at: self.answered_at,
        }
    }
}

/// One entry of the append-only answer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLog {
    pub id: i64,
    pub user_id: UserId,
    pub assessment: Assessment,
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Correct/total tally for one assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerTally {
    pub assessment: Assessment,
    pub correct: u32,
    pub total: u32,
}

impl AnswerTally {
    /// # Errors
    ///
    /// Returns `ScoreError::NoQuestions` for an empty tally.
    pub fn score(&self) -> Result<Score, ScoreError> {
        Score::from_answers(self.correct, self.total)
    }
}

/// Per-assessment tallies over a student's log, in course order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AnswerSummary {
    pub tallies: Vec<AnswerTally>,
}

impl AnswerSummary {
    #[must_use]
    pub fn from_logs(logs: &[AnswerLog]) -> Self {
        let mut by_assessment: BTreeMap<Assessment, (u32, u32)> = BTreeMap::new();
        for log in logs {
            let slot = by_assessment.entry(log.assessment).or_default();
            slot.0 = slot.0.saturating_add(u32::from(log.is_correct));
            slot.1 = slot.1.saturating_add(1);
        }
        Self {
            tallies: by_assessment
                .into_iter()
                .map(|(assessment, (correct, total))| AnswerTally {
                    assessment,
                    correct,
                    total,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn tally(&self, assessment: Assessment) -> Option<&AnswerTally> {
        self.tallies.iter().find(|t| t.assessment == assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(assessment: Assessment, question: &str, correct: bool) -> AnswerDraft {
        AnswerDraft {
            assessment,
            question_id: question.into(),
            answer: "  B ".into(),
            is_correct: correct,
        }
    }

    #[test]
    fn validate_trims_fields() {
        let user = UserId::generate();
        let new = draft(Assessment::PreTest, " q1 ", true)
            .validate(user, fixed_now())
            .unwrap();
        assert_eq!(new.question_id, "q1");
        assert_eq!(new.answer, "B");
        assert_eq!(new.assign_id(7).id, 7);
    }

    #[test]
    fn validate_rejects_blank_question_and_long_answer() {
        let user = UserId::generate();
        assert_eq!(
            draft(Assessment::PreTest, "  ", true)
                .validate(user, fixed_now())
                .unwrap_err(),
            AnswerError::EmptyQuestion
        );
        let mut long = draft(Assessment::PostTest, "q", false);
        long.answer = "x".repeat(MAX_ANSWER_CHARS + 1);
        assert!(matches!(
            long.validate(user, fixed_now()),
            Err(AnswerError::AnswerTooLong { .. })
        ));
    }

    #[test]
    fn assessment_wire_names_match_tabs() {
        assert_eq!(Assessment::LessonQuiz(LessonId::new(3)).to_string(), "lesson3");
        assert_eq!("posttest".parse::<Assessment>().unwrap(), Assessment::PostTest);
        assert!("final".parse::<Assessment>().is_err());
    }

    #[test]
    fn summary_tallies_in_course_order() {
        let user = UserId::generate();
        let logs: Vec<AnswerLog> = [
            (Assessment::PostTest, true),
            (Assessment::PreTest, true),
            (Assessment::PreTest, false),
            (Assessment::LessonQuiz(LessonId::new(1)), true),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (a, ok))| {
            draft(a, "q", ok)
                .validate(user, fixed_now())
                .unwrap()
                .assign_id(i64::try_from(i).unwrap())
        })
        .collect();

        let summary = AnswerSummary::from_logs(&logs);
        let order: Vec<Assessment> = summary.tallies.iter().map(|t| t.assessment).collect();
        assert_eq!(
            order,
            vec![
                Assessment::PreTest,
                Assessment::LessonQuiz(LessonId::new(1)),
                Assessment::PostTest
            ]
        );
        let pre = summary.tally(Assessment::PreTest).unwrap();
        assert_eq!((pre.correct, pre.total), (1, 2));
        assert_eq!(pre.score().unwrap().percent(), 50);
    }
}
