use std::sync::Arc;

use learn_core::model::{
    ActionOutcome, AnswerDraft, AnswerLog, Curriculum, ProgressAction, StudentProgress, Tab, UserId,
};
use serde::{Deserialize, Serialize};
use storage::repository::{AnswerLogRepository, ProgressRepository};
use tracing::{debug, info};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Progress record plus the gate state derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    pub progress: StudentProgress,
    pub unlocked_tabs: Vec<Tab>,
    pub current_tab: Tab,
    pub percent_complete: u8,
}

impl ProgressView {
    #[must_use]
    pub fn new(progress: StudentProgress, curriculum: &Curriculum) -> Self {
        Self {
            unlocked_tabs: progress.unlocked_tabs(curriculum),
            current_tab: progress.current_tab(curriculum),
            percent_complete: progress.percent_complete(curriculum),
            progress,
        }
    }
}

/// Result of applying a student action on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedAction {
    pub outcome: ActionOutcome,
    pub view: ProgressView,
}

/// Server-side owner of the student progress table and the answer log.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    curriculum: Arc<Curriculum>,
    progress: Arc<dyn ProgressRepository>,
    answers: Arc<dyn AnswerLogRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        curriculum: Arc<Curriculum>,
        progress: Arc<dyn ProgressRepository>,
        answers: Arc<dyn AnswerLogRepository>,
    ) -> Self {
        Self {
            clock,
            curriculum,
            progress,
            answers,
        }
    }

    #[must_use]
    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    #[must_use]
    pub fn view(&self, progress: StudentProgress) -> ProgressView {
        ProgressView::new(progress, &self.curriculum)
    }

    /// Stored progress for `user_id`, creating a fresh record on first use.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on repository failures.
    pub async fn load_or_create(
        &self,
        user_id: UserId,
    ) -> Result<StudentProgress, ProgressServiceError> {
        if let Some(mut stored) = self.progress.get_progress(user_id).await? {
            stored.align_with(&self.curriculum);
            return Ok(stored);
        }
        let fresh = StudentProgress::new(user_id, &self.curriculum, self.clock.now());
        let stored = self.progress.save_progress_lww(&fresh).await?;
        debug!(%user_id, "created progress record");
        Ok(stored)
    }

    /// Whole-record last-write-wins save from a client. Returns the copy
    /// that is stored afterwards, which is the caller's record unless the
    /// server already holds a later one.
    ///
    /// # Errors
    ///
    /// Returns `WrongOwner` when the record belongs to someone else,
    /// `Progress` when it breaks the unlock gates, and `Storage` on
    /// repository failures.
    pub async fn save(
        &self,
        user_id: UserId,
        mut progress: StudentProgress,
    ) -> Result<StudentProgress, ProgressServiceError> {
        if progress.user_id() != user_id {
            return Err(ProgressServiceError::WrongOwner);
        }
        progress.align_with(&self.curriculum);
        progress.check(&self.curriculum)?;
        let incoming_at = progress.updated_at();
        let stored = self.progress.save_progress_lww(&progress).await?;
        if stored.updated_at() > incoming_at {
            debug!(%user_id, "kept newer stored progress");
        }
        Ok(stored)
    }

    /// Load, run one action through the state machine, persist.
    ///
    /// # Errors
    ///
    /// Returns `Progress` for gate violations and `Storage` on repository
    /// failures.
    pub async fn apply(
        &self,
        user_id: UserId,
        action: &ProgressAction,
    ) -> Result<AppliedAction, ProgressServiceError> {
        let mut progress = self.load_or_create(user_id).await?;
        let outcome = action.apply(&mut progress, &self.curriculum, self.clock.now())?;
        if outcome.changed {
            progress = self.progress.save_progress_lww(&progress).await?;
            info!(
                %user_id,
                action = action.kind(),
                current_tab = %progress.current_tab(&self.curriculum),
                "progress updated"
            );
        }
        Ok(AppliedAction {
            outcome,
            view: self.view(progress),
        })
    }

    /// Append one quiz answer to the log.
    ///
    /// # Errors
    ///
    /// Returns `Answer` for invalid drafts and `Storage` on repository
    /// failures.
    pub async fn record_answer(
        &self,
        user_id: UserId,
        draft: AnswerDraft,
    ) -> Result<AnswerLog, ProgressServiceError> {
        let answer = draft.validate(user_id, self.clock.now())?;
        Ok(self.answers.append_answer(answer).await?)
    }

    /// # Errors
    ///
    /// Returns `Storage` on repository failures.
    pub async fn answers(&self, user_id: UserId) -> Result<Vec<AnswerLog>, ProgressServiceError> {
        Ok(self.answers.answers_for_user(user_id).await?)
    }

    /// Replace a student's record with a fresh one and clear their answers.
    /// The fresh record is written unconditionally so it wins over any
    /// record stamped with a skewed clock.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on repository failures.
    pub async fn reset(&self, user_id: UserId) -> Result<StudentProgress, ProgressServiceError> {
        let fresh = StudentProgress::new(user_id, &self.curriculum, self.clock.now());
        self.progress.delete_progress(user_id).await?;
        let stored = self.progress.save_progress_lww(&fresh).await?;
        let removed = self.answers.delete_answers_for_user(user_id).await?;
        info!(%user_id, removed_answers = removed, "progress reset");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use learn_core::model::{Assessment, LessonId, ProgressError, Score};
    use learn_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn service(repo: &InMemoryRepository, clock: Clock) -> ProgressService {
        ProgressService::new(
            clock,
            Arc::new(Curriculum::science()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn first_load_creates_fresh_record() {
        let repo = InMemoryRepository::new();
        let svc = service(&repo, Clock::fixed(fixed_now()));
        let user = UserId::generate();

        let progress = svc.load_or_create(user).await.unwrap();
        assert_eq!(progress.updated_at(), fixed_now());
        assert_eq!(repo.get_progress(user).await.unwrap(), Some(progress));
    }

    #[tokio::test]
    async fn locked_action_is_rejected_and_not_stored() {
        let repo = InMemoryRepository::new();
        let svc = service(&repo, Clock::fixed(fixed_now()));
        let user = UserId::generate();

        let err = svc
            .apply(
                user,
                &ProgressAction::RecordQuiz {
                    lesson: LessonId::new(1),
                    score: Score::PERFECT,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::Progress(ProgressError::Locked(_))
        ));
        let stored = repo.get_progress(user).await.unwrap().unwrap();
        assert!(!stored.pretest().completed);
    }

    #[tokio::test]
    async fn save_rejects_foreign_records() {
        let repo = InMemoryRepository::new();
        let svc = service(&repo, Clock::fixed(fixed_now()));
        let c = Curriculum::science();
        let user = UserId::generate();

        let other = StudentProgress::new(UserId::generate(), &c, fixed_now());
        assert!(matches!(
            svc.save(user, other).await.unwrap_err(),
            ProgressServiceError::WrongOwner
        ));

        let mut valid = StudentProgress::new(user, &c, fixed_now());
        valid
            .complete_pretest(Score::new(40).unwrap(), fixed_now() + Duration::seconds(1))
            .unwrap();
        let stored = svc.save(user, valid.clone()).await.unwrap();
        assert_eq!(stored, valid);
    }

    #[tokio::test]
    async fn save_keeps_newer_server_copy() {
        let repo = InMemoryRepository::new();
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::minutes(10));
        let svc = service(&repo, clock);
        let user = UserId::generate();

        svc.apply(
            user,
            &ProgressAction::CompletePretest {
                score: Score::new(50).unwrap(),
            },
        )
        .await
        .unwrap();

        let stale = StudentProgress::new(user, &Curriculum::science(), fixed_now());
        let stored = svc.save(user, stale).await.unwrap();
        assert!(stored.pretest().completed);
    }

    #[tokio::test]
    async fn reset_clears_answers_and_progress() {
        let repo = InMemoryRepository::new();
        let svc = service(&repo, Clock::fixed(fixed_now()));
        let user = UserId::generate();

        svc.apply(
            user,
            &ProgressAction::CompletePretest {
                score: Score::new(50).unwrap(),
            },
        )
        .await
        .unwrap();
        svc.record_answer(
            user,
            AnswerDraft {
                assessment: Assessment::PreTest,
                question_id: "pt-1".into(),
                answer: "solid".into(),
                is_correct: true,
            },
        )
        .await
        .unwrap();

        let fresh = svc.reset(user).await.unwrap();
        assert!(!fresh.pretest().completed);
        assert!(svc.answers(user).await.unwrap().is_empty());
    }
}
