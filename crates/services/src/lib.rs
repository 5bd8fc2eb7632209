#![forbid(unsafe_code)]

pub mod admin_service;
pub mod app_services;
pub mod auth_service;
pub mod error;
pub mod progress_service;
pub mod sync;

pub use learn_core::Clock;

pub use admin_service::{
    AdminService, NewUserRequest, SeedOutcome, StudentDetail, StudentOverview, UserPatch,
};
pub use app_services::AppServices;
pub use auth_service::{AuthService, Session};
pub use error::{AdminError, AppServicesError, AuthError, ProgressServiceError, SyncError};
pub use progress_service::{AppliedAction, ProgressService, ProgressView};
pub use sync::{
    DEFAULT_SYNC_DELAY, DebouncedWriter, HttpProgressStore, ProgressSync, RemoteProgressStore,
    RepositoryRemote,
};
