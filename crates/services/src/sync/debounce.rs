use std::sync::Arc;
use std::time::Duration;

use learn_core::model::StudentProgress;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::remote::RemoteProgressStore;

/// Quiet period before a scheduled write reaches the remote.
pub const DEFAULT_SYNC_DELAY: Duration = Duration::from_millis(750);

enum Command {
    Schedule(StudentProgress),
    Flush(oneshot::Sender<Option<StudentProgress>>),
}

/// Trailing-edge debounce in front of a `RemoteProgressStore`.
///
/// Only the latest scheduled copy is kept. It is pushed once `delay` passes
/// without another `schedule`, or right away on `flush`. Failed pushes are
/// logged and dropped; the next schedule carries the newer state anyway.
/// Dropping the writer pushes whatever is still pending.
pub struct DebouncedWriter {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl DebouncedWriter {
    /// Start the background task on the current tokio runtime.
    #[must_use]
    pub fn spawn(remote: Arc<dyn RemoteProgressStore>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(remote, delay, rx));
        Self { tx, task }
    }

    /// Replace the pending copy and restart the quiet period.
    pub fn schedule(&self, progress: StudentProgress) {
        if self.tx.send(Command::Schedule(progress)).is_err() {
            warn!("sync writer stopped, dropping scheduled progress");
        }
    }

    /// Push the pending copy now and wait for the result.
    ///
    /// Returns the copy the remote kept, or `None` when nothing was pending
    /// or the push failed.
    pub async fn flush(&self) -> Option<StudentProgress> {
        let (ack, done) = oneshot::channel();
        self.tx.send(Command::Flush(ack)).ok()?;
        done.await.ok().flatten()
    }

    /// Push anything pending, then stop the task.
    pub async fn close(self) {
        let Self { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!(error = %e, "sync writer task failed");
        }
    }
}

async fn run(
    remote: Arc<dyn RemoteProgressStore>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<StudentProgress> = None;
    loop {
        let next = if pending.is_some() {
            match tokio::time::timeout(delay, rx.recv()).await {
                Ok(cmd) => cmd,
                Err(_elapsed) => {
                    push(remote.as_ref(), pending.take()).await;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match next {
            Some(Command::Schedule(progress)) => pending = Some(progress),
            Some(Command::Flush(ack)) => {
                let kept = push(remote.as_ref(), pending.take()).await;
                let _ = ack.send(kept);
            }
            None => {
                push(remote.as_ref(), pending.take()).await;
                break;
            }
        }
    }
}

async fn push(
    remote: &dyn RemoteProgressStore,
    progress: Option<StudentProgress>,
) -> Option<StudentProgress> {
    let progress = progress?;
    let user_id = progress.user_id();
    match remote.push(&progress).await {
        Ok(kept) => {
            debug!(%user_id, updated_at = %kept.updated_at(), "progress pushed");
            Some(kept)
        }
        Err(e) => {
            warn!(%user_id, error = %e, "progress push failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use learn_core::model::{Curriculum, Score, UserId};
    use learn_core::time::fixed_now;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRemote {
        pushes: Mutex<Vec<StudentProgress>>,
    }

    impl RecordingRemote {
        fn pushes(&self) -> Vec<StudentProgress> {
            self.pushes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteProgressStore for RecordingRemote {
        async fn fetch(&self, _user_id: UserId) -> Result<Option<StudentProgress>, SyncError> {
            Ok(None)
        }

        async fn push(&self, progress: &StudentProgress) -> Result<StudentProgress, SyncError> {
            self.pushes.lock().unwrap().push(progress.clone());
            Ok(progress.clone())
        }
    }

    fn snapshot(user: UserId, seconds: i64) -> StudentProgress {
        let c = Curriculum::science();
        let mut p = StudentProgress::new(user, &c, fixed_now());
        p.complete_pretest(
            Score::new(10).unwrap(),
            fixed_now() + ChronoDuration::seconds(seconds),
        )
        .unwrap();
        p
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_into_one_push() {
        let remote = Arc::new(RecordingRemote::default());
        let writer = DebouncedWriter::spawn(remote.clone(), DEFAULT_SYNC_DELAY);
        let user = UserId::generate();

        for i in 0..5 {
            writer.schedule(snapshot(user, i));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(remote.pushes().is_empty());

        tokio::time::sleep(DEFAULT_SYNC_DELAY * 2).await;
        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0], snapshot(user, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_pushes_immediately() {
        let remote = Arc::new(RecordingRemote::default());
        let writer = DebouncedWriter::spawn(remote.clone(), Duration::from_secs(60));
        let user = UserId::generate();

        assert_eq!(writer.flush().await, None);

        writer.schedule(snapshot(user, 1));
        assert_eq!(writer.flush().await, Some(snapshot(user, 1)));
        assert_eq!(remote.pushes().len(), 1);

        // nothing left to push
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(remote.pushes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_pushes_pending_copy() {
        let remote = Arc::new(RecordingRemote::default());
        let writer = DebouncedWriter::spawn(remote.clone(), Duration::from_secs(60));
        writer.schedule(snapshot(UserId::generate(), 3));
        writer.close().await;
        assert_eq!(remote.pushes().len(), 1);
    }
}
