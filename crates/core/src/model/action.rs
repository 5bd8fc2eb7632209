use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::curriculum::Curriculum;
use crate::model::ids::{LessonId, SectionId};
use crate::model::progress::{ProgressError, QuizOutcome, StudentProgress};
use crate::model::score::Score;

/// A single student step, as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressAction {
    CompletePretest { score: Score },
    CompleteSection { lesson: LessonId, section: SectionId },
    RecordQuiz { lesson: LessonId, score: Score },
    CompletePosttest { score: Score },
}

/// Effect of applying a `ProgressAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// False when the action was an idempotent repeat.
    pub changed: bool,
    pub quiz: Option<QuizOutcome>,
}

impl ProgressAction {
    /// Run the action through the unlock-gate state machine.
    ///
    /// # Errors
    ///
    /// Propagates the `ProgressError` raised by the transition.
    pub fn apply(
        &self,
        progress: &mut StudentProgress,
        curriculum: &Curriculum,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ProgressError> {
        let done = |changed| ActionOutcome {
            changed,
            quiz: None,
        };
        match self {
            ProgressAction::CompletePretest { score } => {
                progress.complete_pretest(*score, now).map(|()| done(true))
            }
            ProgressAction::CompleteSection { lesson, section } => progress
                .complete_section(curriculum, *lesson, section, now)
                .map(done),
            ProgressAction::RecordQuiz { lesson, score } => progress
                .record_quiz(curriculum, *lesson, *score, now)
                .map(|quiz| ActionOutcome {
                    changed: true,
                    quiz: Some(quiz),
                }),
            ProgressAction::CompletePosttest { score } => progress
                .complete_posttest(curriculum, *score, now)
                .map(|()| done(true)),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressAction::CompletePretest { .. } => "complete_pretest",
            ProgressAction::CompleteSection { .. } => "complete_section",
            ProgressAction::RecordQuiz { .. } => "record_quiz",
            ProgressAction::CompletePosttest { .. } => "complete_posttest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::curriculum::Tab;
    use crate::model::ids::UserId;
    use crate::time::fixed_now;

    #[test]
    fn deserializes_tagged_actions() {
        let action: ProgressAction = serde_json::from_str(
            r#"{"type":"complete_section","lesson":1,"section":"introduction"}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            ProgressAction::CompleteSection {
                lesson: LessonId::new(1),
                section: SectionId::new("introduction").unwrap(),
            }
        );
        assert!(
            serde_json::from_str::<ProgressAction>(r#"{"type":"complete_pretest","score":140}"#)
                .is_err()
        );
    }

    #[test]
    fn apply_reports_quiz_outcome() {
        let c = Curriculum::science();
        let mut p = StudentProgress::new(UserId::generate(), &c, fixed_now());
        ProgressAction::CompletePretest {
            score: Score::new(20).unwrap(),
        }
        .apply(&mut p, &c, fixed_now())
        .unwrap();

        let lesson = c.lesson(LessonId::new(1)).unwrap().clone();
        for section in lesson.sections {
            let out = ProgressAction::CompleteSection {
                lesson: lesson.id,
                section,
            }
            .apply(&mut p, &c, fixed_now())
            .unwrap();
            assert!(out.changed);
        }

        let out = ProgressAction::RecordQuiz {
            lesson: lesson.id,
            score: Score::new(90).unwrap(),
        }
        .apply(&mut p, &c, fixed_now())
        .unwrap();
        assert_eq!(
            out.quiz.unwrap().unlocked,
            Some(Tab::Lesson(LessonId::new(2)))
        );
    }
}
