use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::UserId;
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{db_err, ser, user_id_from_text, user_id_to_text},
};
use crate::repository::{AuthToken, CredentialRepository, StorageError};

#[async_trait]
impl CredentialRepository for SqliteRepository {
    async fn set_password_hash(&self, user_id: UserId, hash: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO credentials (user_id, password_hash, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id) DO UPDATE SET
                    password_hash = excluded.password_hash,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_to_text(user_id))
        .bind(hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn password_hash(&self, user_id: UserId) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar("SELECT password_hash FROM credentials WHERE user_id = ?1")
            .bind(user_id_to_text(user_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn issue_token(&self, token: &AuthToken) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?1 AND expires_at <= ?2")
            .bind(user_id_to_text(token.user_id))
            .bind(token.issued_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            r"
                INSERT INTO auth_tokens (token, user_id, issued_at, expires_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(token.token.as_str())
        .bind(user_id_to_text(token.user_id))
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn resolve_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, StorageError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM auth_tokens WHERE token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(ser)?;
        if now >= expires_at {
            self.revoke_token(token).await?;
            return Ok(None);
        }
        let user_id: String = row.try_get("user_id").map_err(ser)?;
        user_id_from_text(&user_id).map(Some)
    }

    async fn revoke_token(&self, token: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM auth_tokens WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn revoke_tokens_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?1")
            .bind(user_id_to_text(user_id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
