mod action;
mod answer;
mod curriculum;
mod ids;
mod progress;
mod score;
mod user;

pub use ids::{LessonId, ParseIdError, SectionId, UserId};

pub use action::{ActionOutcome, ProgressAction};
pub use answer::{
    AnswerDraft, AnswerError, AnswerLog, AnswerSummary, AnswerTally, Assessment, MAX_ANSWER_CHARS,
    NewAnswer,
};
pub use curriculum::{Curriculum, CurriculumError, LessonDef, Tab};
pub use progress::{
    AssessmentResult, LessonProgress, ProgressError, QuizOutcome, StudentProgress, reconcile,
};
pub use score::{Score, ScoreError};
pub use user::{Email, Role, User, UserError, normalize_display_name};
