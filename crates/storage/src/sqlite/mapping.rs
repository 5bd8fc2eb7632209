use chrono::{DateTime, Utc};
use learn_core::model::{
    AnswerLog, Assessment, AssessmentResult, Email, LessonProgress, Role, Score, StudentProgress,
    User, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Map driver errors, surfacing constraint violations as domain outcomes.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    StorageError::Connection(e.to_string())
}

pub(crate) fn user_id_to_text(id: UserId) -> String {
    id.value().to_string()
}

pub(crate) fn user_id_from_text(raw: &str) -> Result<UserId, StorageError> {
    raw.parse::<UserId>().map_err(ser)
}

pub(crate) fn score_to_i64(score: Option<Score>) -> Option<i64> {
    score.map(|s| i64::from(s.percent()))
}

fn score_from_i64(field: &'static str, v: Option<i64>) -> Result<Option<Score>, StorageError> {
    v.map(|raw| {
        u32::try_from(raw)
            .ok()
            .and_then(|p| Score::new(p).ok())
            .ok_or_else(|| StorageError::Serialization(format!("invalid {field}: {raw}")))
    })
    .transpose()
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<User, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let email: String = row.try_get("email").map_err(ser)?;
    let role: String = row.try_get("role").map_err(ser)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;

    User::new(
        user_id_from_text(&id)?,
        Email::parse(&email).map_err(ser)?,
        role.parse::<Role>().map_err(ser)?,
        row.try_get("display_name").map_err(ser)?,
        created_at,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<StudentProgress, StorageError> {
    let user_id: String = row.try_get("user_id").map_err(ser)?;
    let lessons_json: String = row.try_get("lessons").map_err(ser)?;
    let lessons: Vec<LessonProgress> = serde_json::from_str(&lessons_json).map_err(ser)?;

    let pretest = AssessmentResult {
        score: score_from_i64("pretest_score", row.try_get("pretest_score").map_err(ser)?)?,
        completed: row.try_get("pretest_completed").map_err(ser)?,
    };
    let posttest = AssessmentResult {
        score: score_from_i64("posttest_score", row.try_get("posttest_score").map_err(ser)?)?,
        completed: row.try_get("posttest_completed").map_err(ser)?,
    };

    Ok(StudentProgress::from_persisted(
        user_id_from_text(&user_id)?,
        pretest,
        lessons,
        posttest,
        row.try_get("updated_at").map_err(ser)?,
    ))
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<AnswerLog, StorageError> {
    let user_id: String = row.try_get("user_id").map_err(ser)?;
    let assessment: String = row.try_get("assessment").map_err(ser)?;
    Ok(AnswerLog {
        id: row.try_get("id").map_err(ser)?,
        user_id: user_id_from_text(&user_id)?,
        assessment: assessment.parse::<Assessment>().map_err(ser)?,
        question_id: row.try_get("question_id").map_err(ser)?,
        answer: row.try_get("answer").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}
