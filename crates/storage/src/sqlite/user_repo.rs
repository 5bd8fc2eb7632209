use async_trait::async_trait;
use learn_core::model::{Email, User, UserId};

use super::{
    SqliteRepository,
    mapping::{db_err, map_user_row, user_id_to_text},
};
use crate::repository::{StorageError, UserRepository};

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn insert_user(&self, user: &User) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO users (id, email, role, display_name, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(user_id_to_text(user.id))
        .bind(user.email.as_str())
        .bind(user.role.as_str())
        .bind(user.display_name.as_deref())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            "SELECT id, email, role, display_name, created_at FROM users WHERE id = ?1",
        )
        .bind(user_id_to_text(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(map_user_row).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            "SELECT id, email, role, display_name, created_at FROM users WHERE email = ?1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(map_user_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, email, role, display_name, created_at
                FROM users
                ORDER BY created_at ASC, email ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(map_user_row).collect()
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE users
                SET email = ?2, role = ?3, display_name = ?4
                WHERE id = ?1
            ",
        )
        .bind(user_id_to_text(user.id))
        .bind(user.email.as_str())
        .bind(user.role.as_str())
        .bind(user.display_name.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StorageError> {
        // progress, answers, credentials and tokens go with the row via ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id_to_text(id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn count_admins(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
