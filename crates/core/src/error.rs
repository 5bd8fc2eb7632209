use thiserror::Error;

use crate::model::{AnswerError, CurriculumError, ProgressError, ScoreError, UserError};

/// Umbrella for every domain validation failure in this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    User(#[from] UserError),
}
