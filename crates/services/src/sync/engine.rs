use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use learn_core::model::{
    ActionOutcome, Curriculum, ProgressAction, StudentProgress, UserId, reconcile,
};
use storage::local::{LocalStore, ProgressCache};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::debounce::DebouncedWriter;
use super::remote::RemoteProgressStore;
use crate::Clock;
use crate::error::SyncError;

/// Work done before the remote copy could be read.
struct Offline {
    cached: Option<StudentProgress>,
    actions: Vec<ProgressAction>,
}

struct State {
    current: StudentProgress,
    /// `Some` until a remote fetch succeeds. Nothing is pushed meanwhile.
    offline: Option<Offline>,
}

/// Client-side progress holder for one signed-in student.
///
/// Actions update the in-memory copy first, then the local cache, then
/// schedule a debounced remote write. The remote is never on the critical
/// path: if it cannot be read at `open`, the engine works from the cache
/// and holds back every push until a later fetch succeeds, so a stand-in
/// record never overwrites the server copy.
pub struct ProgressSync<S: LocalStore + ?Sized> {
    clock: Clock,
    curriculum: Arc<Curriculum>,
    cache: ProgressCache<S>,
    remote: Arc<dyn RemoteProgressStore>,
    writer: DebouncedWriter,
    state: Mutex<State>,
}

/// Reconcile the cached and remote copies, then replay offline actions on
/// the winner. Returns the result and whether the remote is behind it.
fn settle(
    user_id: UserId,
    curriculum: &Curriculum,
    clock: &Clock,
    cached: Option<StudentProgress>,
    remote_copy: Option<StudentProgress>,
    replay: &[ProgressAction],
) -> (StudentProgress, bool) {
    let local_at = cached.as_ref().map(StudentProgress::updated_at);
    let remote_at = remote_copy.as_ref().map(StudentProgress::updated_at);
    let mut winner = reconcile(cached, remote_copy)
        .unwrap_or_else(|| StudentProgress::new(user_id, curriculum, clock.now()));
    winner.align_with(curriculum);

    for action in replay {
        if let Err(e) = action.apply(&mut winner, curriculum, clock.now()) {
            debug!(%user_id, action = action.kind(), error = %e, "offline action dropped");
        }
    }
    debug!(
        %user_id,
        local = ?local_at,
        remote = ?remote_at,
        replayed = replay.len(),
        "progress reconciled"
    );

    let remote_behind = remote_at.is_none_or(|at| at < winner.updated_at());
    (winner, remote_behind)
}

impl<S: LocalStore + ?Sized> ProgressSync<S> {
    /// Load the cached and remote copies, keep the later one, and write it
    /// back to whichever side is behind.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Local` if the local cache cannot be read or
    /// written.
    pub async fn open(
        user_id: UserId,
        curriculum: Arc<Curriculum>,
        cache: ProgressCache<S>,
        remote: Arc<dyn RemoteProgressStore>,
        clock: Clock,
        delay: Duration,
    ) -> Result<Self, SyncError> {
        let cached = cache.load(user_id).await.map_err(SyncError::Local)?;
        let writer = DebouncedWriter::spawn(Arc::clone(&remote), delay);

        let state = match remote.fetch(user_id).await {
            Ok(remote_copy) => {
                let (current, remote_behind) =
                    settle(user_id, &curriculum, &clock, cached, remote_copy, &[]);
                if remote_behind {
                    writer.schedule(current.clone());
                }
                State {
                    current,
                    offline: None,
                }
            }
            Err(e) => {
                warn!(%user_id, error = %e, "remote unavailable, working offline");
                // A stand-in dated at the epoch loses to any real copy, even
                // after it reaches the cache.
                let mut current = cached.clone().unwrap_or_else(|| {
                    StudentProgress::new(user_id, &curriculum, DateTime::<Utc>::UNIX_EPOCH)
                });
                current.align_with(&curriculum);
                State {
                    current,
                    offline: Some(Offline {
                        cached,
                        actions: Vec::new(),
                    }),
                }
            }
        };
        cache.save(&state.current).await.map_err(SyncError::Local)?;

        Ok(Self {
            clock,
            curriculum,
            cache,
            remote,
            writer,
            state: Mutex::new(state),
        })
    }

    /// Retry the remote read while offline. On success the offline actions
    /// are replayed on the reconciled copy and pushes resume.
    async fn reconnect(&self, state: &mut State) -> Result<(), SyncError> {
        if state.offline.is_none() {
            return Ok(());
        }
        let user_id = state.current.user_id();
        let remote_copy = match self.remote.fetch(user_id).await {
            Ok(copy) => copy,
            Err(e) => {
                debug!(%user_id, error = %e, "remote still unavailable");
                return Ok(());
            }
        };
        let Some(offline) = state.offline.take() else {
            return Ok(());
        };

        let (current, remote_behind) = settle(
            user_id,
            &self.curriculum,
            &self.clock,
            offline.cached,
            remote_copy,
            &offline.actions,
        );
        info!(%user_id, replayed = offline.actions.len(), "back online");
        state.current = current.clone();
        if remote_behind {
            self.writer.schedule(current.clone());
        }
        self.cache.save(&current).await.map_err(SyncError::Local)
    }

    /// Run one action. Idempotent repeats touch nothing.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Progress` for gate violations (state unchanged)
    /// and `SyncError::Local` if the cache write fails; the in-memory copy
    /// and the scheduled remote write stand in that case.
    pub async fn apply(&self, action: &ProgressAction) -> Result<ActionOutcome, SyncError> {
        let mut state = self.state.lock().await;
        self.reconnect(&mut state).await?;

        let mut next = state.current.clone();
        let outcome = action.apply(&mut next, &self.curriculum, self.clock.now())?;
        if !outcome.changed {
            return Ok(outcome);
        }

        state.current = next.clone();
        match state.offline.as_mut() {
            Some(offline) => offline.actions.push(action.clone()),
            None => self.writer.schedule(next.clone()),
        }
        info!(
            user_id = %next.user_id(),
            action = action.kind(),
            current_tab = %next.current_tab(&self.curriculum),
            "progress advanced"
        );
        self.cache.save(&next).await.map_err(SyncError::Local)?;
        Ok(outcome)
    }

    pub async fn snapshot(&self) -> StudentProgress {
        self.state.lock().await.current.clone()
    }

    /// Whether the remote copy is still unread.
    pub async fn is_offline(&self) -> bool {
        self.state.lock().await.offline.is_some()
    }

    /// Push pending changes now. If the remote kept a later copy than ours,
    /// adopt it. While offline this only retries the remote read.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Local` if adopting the remote copy fails to reach
    /// the cache.
    pub async fn flush(&self) -> Result<StudentProgress, SyncError> {
        let mut state = self.state.lock().await;
        self.reconnect(&mut state).await?;
        if state.offline.is_some() {
            return Ok(state.current.clone());
        }

        if let Some(mut remote) = self.writer.flush().await {
            if remote.updated_at() > state.current.updated_at() {
                remote.align_with(&self.curriculum);
                info!(user_id = %remote.user_id(), "adopted newer remote progress");
                self.cache.save(&remote).await.map_err(SyncError::Local)?;
                state.current = remote;
            }
        }
        Ok(state.current.clone())
    }

    /// Best-effort final flush, e.g. on sign-out or shutdown. Offline work
    /// that never reached the remote stays in the local cache.
    pub async fn close(self) {
        {
            let mut state = self.state.lock().await;
            if let Err(e) = self.reconnect(&mut state).await {
                warn!(error = %e, "final reconnect failed");
            }
        }
        self.writer.close().await;
    }
}
