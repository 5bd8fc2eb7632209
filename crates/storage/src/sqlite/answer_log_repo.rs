use async_trait::async_trait;
use learn_core::model::{AnswerLog, NewAnswer, UserId};

use super::{
    SqliteRepository,
    mapping::{db_err, map_answer_row, user_id_to_text},
};
use crate::repository::{AnswerLogRepository, StorageError};

#[async_trait]
impl AnswerLogRepository for SqliteRepository {
    async fn append_answer(&self, answer: NewAnswer) -> Result<AnswerLog, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO answer_logs (
                    user_id, assessment, question_id, answer, is_correct, answered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(user_id_to_text(answer.user_id))
        .bind(answer.assessment.to_string())
        .bind(answer.question_id.as_str())
        .bind(answer.answer.as_str())
        .bind(answer.is_correct)
        .bind(answer.answered_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(answer.assign_id(res.last_insert_rowid()))
    }

    async fn answers_for_user(&self, user_id: UserId) -> Result<Vec<AnswerLog>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, assessment, question_id, answer, is_correct, answered_at
                FROM answer_logs
                WHERE user_id = ?1
                ORDER BY answered_at ASC, id ASC
            ",
        )
        .bind(user_id_to_text(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }

    async fn delete_answers_for_user(&self, user_id: UserId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM answer_logs WHERE user_id = ?1")
            .bind(user_id_to_text(user_id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }
}
