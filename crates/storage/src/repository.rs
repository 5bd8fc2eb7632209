use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{AnswerLog, Email, NewAnswer, Role, StudentProgress, User, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Bearer token issued at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Remote progress table.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch a student's progress, `None` if they never started.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress(&self, user_id: UserId) -> Result<Option<StudentProgress>, StorageError>;

    /// Last-write-wins upsert: the incoming record is stored unless the
    /// stored copy has a strictly later `updated_at`. Returns whichever copy
    /// is stored afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn save_progress_lww(
        &self,
        progress: &StudentProgress,
    ) -> Result<StudentProgress, StorageError>;

    /// Remove a student's progress row. Missing rows are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_progress(&self, user_id: UserId) -> Result<(), StorageError>;

    /// Every stored progress row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_progress(&self) -> Result<Vec<StudentProgress>, StorageError>;
}

/// Append-only quiz answer log.
#[async_trait]
pub trait AnswerLogRepository: Send + Sync {
    /// Append an answer and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn append_answer(&self, answer: NewAnswer) -> Result<AnswerLog, StorageError>;

    /// Answers of one user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn answers_for_user(&self, user_id: UserId) -> Result<Vec<AnswerLog>, StorageError>;

    /// Delete all answers of a user, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_answers_for_user(&self, user_id: UserId) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id or email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StorageError>;

    /// All users, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_users(&self) -> Result<Vec<User>, StorageError>;

    /// Overwrite email, role and display name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown users and
    /// `StorageError::Conflict` when the new email belongs to someone else.
    async fn update_user(&self, user: &User) -> Result<(), StorageError>;

    /// Delete a user together with their progress, answers, credentials and
    /// tokens.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown users.
    async fn delete_user(&self, id: UserId) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_admins(&self) -> Result<u64, StorageError>;
}

/// Password hashes and bearer tokens.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn set_password_hash(&self, user_id: UserId, hash: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn password_hash(&self, user_id: UserId) -> Result<Option<String>, StorageError>;

    /// Store a new token and drop the user's tokens that expired by
    /// `token.issued_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` for a duplicate token.
    async fn issue_token(&self, token: &AuthToken) -> Result<(), StorageError>;

    /// Owner of a token that has not expired at `now`. An expired token is
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn resolve_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn revoke_token(&self, token: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn revoke_tokens_for_user(&self, user_id: UserId) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    progress: HashMap<UserId, StudentProgress>,
    answers: Vec<AnswerLog>,
    next_answer_id: i64,
    users: HashMap<UserId, User>,
    passwords: HashMap<UserId, String>,
    tokens: HashMap<String, AuthToken>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(&self, user_id: UserId) -> Result<Option<StudentProgress>, StorageError> {
        Ok(self.lock()?.progress.get(&user_id).cloned())
    }

    async fn save_progress_lww(
        &self,
        progress: &StudentProgress,
    ) -> Result<StudentProgress, StorageError> {
        let mut guard = self.lock()?;
        if let Some(stored) = guard.progress.get(&progress.user_id()) {
            if stored.updated_at() > progress.updated_at() {
                return Ok(stored.clone());
            }
        }
        guard.progress.insert(progress.user_id(), progress.clone());
        Ok(progress.clone())
    }

    async fn delete_progress(&self, user_id: UserId) -> Result<(), StorageError> {
        self.lock()?.progress.remove(&user_id);
        Ok(())
    }

    async fn list_progress(&self) -> Result<Vec<StudentProgress>, StorageError> {
        let guard = self.lock()?;
        let mut all: Vec<StudentProgress> = guard.progress.values().cloned().collect();
        all.sort_by_key(StudentProgress::user_id);
        Ok(all)
    }
}

#[async_trait]
impl AnswerLogRepository for InMemoryRepository {
    async fn append_answer(&self, answer: NewAnswer) -> Result<AnswerLog, StorageError> {
        let mut guard = self.lock()?;
        guard.next_answer_id += 1;
        let log = answer.assign_id(guard.next_answer_id);
        guard.answers.push(log.clone());
        Ok(log)
    }

    async fn answers_for_user(&self, user_id: UserId) -> Result<Vec<AnswerLog>, StorageError> {
        let guard = self.lock()?;
        let mut logs: Vec<AnswerLog> = guard
            .answers
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        logs.sort_by_key(|a| (a.answered_at, a.id));
        Ok(logs)
    }

    async fn delete_answers_for_user(&self, user_id: UserId) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let before = guard.answers.len();
        guard.answers.retain(|a| a.user_id != user_id);
        Ok(u64::try_from(before - guard.answers.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn insert_user(&self, user: &User) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let taken = guard.users.contains_key(&user.id)
            || guard.users.values().any(|u| u.email == user.email);
        if taken {
            return Err(StorageError::Conflict);
        }
        guard.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StorageError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let guard = self.lock()?;
        let mut users: Vec<User> = guard.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.email.cmp(&b.email))
        });
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.users.contains_key(&user.id) {
            return Err(StorageError::NotFound);
        }
        if guard
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StorageError::Conflict);
        }
        guard.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.users.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        guard.progress.remove(&id);
        guard.answers.retain(|a| a.user_id != id);
        guard.passwords.remove(&id);
        guard.tokens.retain(|_, t| t.user_id != id);
        Ok(())
    }

    async fn count_admins(&self) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard.users.values().filter(|u| u.role == Role::Admin).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl CredentialRepository for InMemoryRepository {
    async fn set_password_hash(&self, user_id: UserId, hash: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.users.contains_key(&user_id) {
            return Err(StorageError::NotFound);
        }
        guard.passwords.insert(user_id, hash.to_owned());
        Ok(())
    }

    async fn password_hash(&self, user_id: UserId) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.passwords.get(&user_id).cloned())
    }

    async fn issue_token(&self, token: &AuthToken) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.tokens.contains_key(&token.token) {
            return Err(StorageError::Conflict);
        }
        guard
            .tokens
            .retain(|_, t| t.user_id != token.user_id || t.is_live(token.issued_at));
        guard.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn resolve_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, StorageError> {
        let mut guard = self.lock()?;
        match guard.tokens.get(token) {
            Some(t) if t.is_live(now) => Ok(Some(t.user_id)),
            Some(_) => {
                guard.tokens.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn revoke_token(&self, token: &str) -> Result<(), StorageError> {
        self.lock()?.tokens.remove(token);
        Ok(())
    }

    async fn revoke_tokens_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.lock()?.tokens.retain(|_, t| t.user_id != user_id);
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub answers: Arc<dyn AnswerLogRepository>,
    pub users: Arc<dyn UserRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository slot to the same backend.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ProgressRepository
            + AnswerLogRepository
            + UserRepository
            + CredentialRepository
            + Clone
            + 'static,
    {
        Self {
            progress: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            users: Arc::new(repo.clone()),
            credentials: Arc::new(repo),
        }
    }
}
