#![forbid(unsafe_code)]

pub mod local;
pub mod repository;
pub mod sqlite;

pub use local::{
    FileLocalStore, LocalStore, MemoryLocalStore, PROGRESS_KEY_PREFIX, ProgressCache, SESSION_KEY,
    progress_key,
};
pub use repository::{
    AnswerLogRepository, AuthToken, CredentialRepository, InMemoryRepository, ProgressRepository,
    Storage, StorageError, UserRepository,
};
