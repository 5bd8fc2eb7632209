//! Local-first progress sync: the in-memory copy and the local cache are
//! updated immediately, the remote table is written later by a debounced
//! background task, and copies are merged last-write-wins.

mod debounce;
mod engine;
mod remote;

pub use debounce::{DEFAULT_SYNC_DELAY, DebouncedWriter};
pub use engine::ProgressSync;
pub use remote::{HttpProgressStore, RemoteProgressStore, RepositoryRemote};
