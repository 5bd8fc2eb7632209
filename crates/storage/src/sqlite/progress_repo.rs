use async_trait::async_trait;
use learn_core::model::{StudentProgress, UserId};

use super::{
    SqliteRepository,
    mapping::{db_err, map_progress_row, score_to_i64, ser, user_id_to_text},
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(&self, user_id: UserId) -> Result<Option<StudentProgress>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    user_id, pretest_score, pretest_completed,
                    posttest_score, posttest_completed, lessons, updated_at
                FROM student_progress
                WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_text(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn save_progress_lww(
        &self,
        progress: &StudentProgress,
    ) -> Result<StudentProgress, StorageError> {
        let user_id = user_id_to_text(progress.user_id());
        let lessons = serde_json::to_string(progress.lessons()).map_err(ser)?;

        // One statement: the write lock is taken up front, so concurrent
        // saves queue on busy_timeout instead of failing a lock upgrade.
        let won = sqlx::query(
            r"
                INSERT INTO student_progress (
                    user_id, pretest_score, pretest_completed,
                    posttest_score, posttest_completed, lessons, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_id) DO UPDATE SET
                    pretest_score = excluded.pretest_score,
                    pretest_completed = excluded.pretest_completed,
                    posttest_score = excluded.posttest_score,
                    posttest_completed = excluded.posttest_completed,
                    lessons = excluded.lessons,
                    updated_at = excluded.updated_at
                WHERE excluded.updated_at >= student_progress.updated_at
                RETURNING user_id
            ",
        )
        .bind(user_id.as_str())
        .bind(score_to_i64(progress.pretest().score))
        .bind(progress.pretest().completed)
        .bind(score_to_i64(progress.posttest().score))
        .bind(progress.posttest().completed)
        .bind(lessons)
        .bind(progress.updated_at())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if won.is_some() {
            return Ok(progress.clone());
        }
        self.get_progress(progress.user_id())
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn delete_progress(&self, user_id: UserId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM student_progress WHERE user_id = ?1")
            .bind(user_id_to_text(user_id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_progress(&self) -> Result<Vec<StudentProgress>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    user_id, pretest_score, pretest_completed,
                    posttest_score, posttest_completed, lessons, updated_at
                FROM student_progress
                ORDER BY user_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_progress_row).collect()
    }
}
