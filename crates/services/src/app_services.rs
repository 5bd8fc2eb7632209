use std::sync::Arc;

use chrono::Duration;
use learn_core::model::Curriculum;
use storage::repository::Storage;

use crate::Clock;
use crate::admin_service::AdminService;
use crate::auth_service::{AuthService, DEFAULT_TOKEN_TTL_HOURS};
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;

/// Assembles the server-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    curriculum: Arc<Curriculum>,
    progress: Arc<ProgressService>,
    auth: Arc<AuthService>,
    admin: Arc<AdminService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        curriculum: Curriculum,
        token_ttl: Duration,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, clock, curriculum, token_ttl))
    }

    /// In-memory services with the built-in curriculum, for tests.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(
            &Storage::in_memory(),
            clock,
            Curriculum::science(),
            Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        )
    }

    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, curriculum: Curriculum, token_ttl: Duration) -> Self {
        let curriculum = Arc::new(curriculum);
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&curriculum),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.answers),
        ));
        let auth = Arc::new(AuthService::new(
            clock,
            token_ttl,
            Arc::clone(&storage.users),
            Arc::clone(&storage.credentials),
        ));
        let admin = Arc::new(AdminService::new(
            clock,
            Arc::clone(&curriculum),
            Arc::clone(&storage.users),
            Arc::clone(&storage.progress),
            Arc::clone(&progress),
            Arc::clone(&auth),
        ));

        Self {
            curriculum,
            progress,
            auth,
            admin,
        }
    }

    #[must_use]
    pub fn curriculum(&self) -> Arc<Curriculum> {
        Arc::clone(&self.curriculum)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn admin(&self) -> Arc<AdminService> {
        Arc::clone(&self.admin)
    }
}
