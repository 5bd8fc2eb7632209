use std::sync::Arc;

use async_trait::async_trait;
use learn_core::model::{StudentProgress, UserId};
use reqwest::{Client, StatusCode};
use storage::repository::ProgressRepository;
use tracing::warn;

use crate::error::SyncError;
use crate::progress_service::ProgressView;

/// Where the authoritative progress copy lives.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `SyncError` when the remote cannot be reached.
    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentProgress>, SyncError>;

    /// Last-write-wins upsert; returns the copy the remote keeps.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` when the remote cannot be reached or refuses the
    /// record.
    async fn push(&self, progress: &StudentProgress) -> Result<StudentProgress, SyncError>;
}

/// Remote backed directly by a repository, for embedded use and tests.
#[derive(Clone)]
pub struct RepositoryRemote {
    repo: Arc<dyn ProgressRepository>,
}

impl RepositoryRemote {
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RemoteProgressStore for RepositoryRemote {
    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentProgress>, SyncError> {
        self.repo
            .get_progress(user_id)
            .await
            .map_err(SyncError::Remote)
    }

    async fn push(&self, progress: &StudentProgress) -> Result<StudentProgress, SyncError> {
        self.repo
            .save_progress_lww(progress)
            .await
            .map_err(SyncError::Remote)
    }
}

/// Remote reached over the HTTP API with a bearer token.
#[derive(Clone)]
pub struct HttpProgressStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpProgressStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn progress_url(&self) -> String {
        format!("{}/api/progress", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteProgressStore for HttpProgressStore {
    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentProgress>, SyncError> {
        let response = self
            .client
            .get(self.progress_url())
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        let view: ProgressView = response.json().await?;
        if view.progress.user_id() != user_id {
            warn!(%user_id, "remote returned progress for another user");
            return Ok(None);
        }
        Ok(Some(view.progress))
    }

    async fn push(&self, progress: &StudentProgress) -> Result<StudentProgress, SyncError> {
        let response = self
            .client
            .put(self.progress_url())
            .bearer_auth(&self.token)
            .json(progress)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        let view: ProgressView = response.json().await?;
        Ok(view.progress)
    }
}
