use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use learn_core::model::{
    AnswerLog, AnswerSummary, Curriculum, Email, Role, Score, StudentProgress, Tab, User, UserId,
    normalize_display_name,
};
use serde::{Deserialize, Serialize};
use storage::repository::{ProgressRepository, StorageError, UserRepository};
use tracing::{info, warn};

use crate::Clock;
use crate::auth_service::{AuthService, MIN_PASSWORD_CHARS};
use crate::error::{AdminError, AuthError};
use crate::progress_service::{ProgressService, ProgressView};

/// Body of an admin "create user" request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUserRequest {
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Partial update; absent fields are left alone. An empty display name
/// clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// One dashboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentOverview {
    pub user_id: UserId,
    pub email: Email,
    pub display_name: Option<String>,
    pub current_tab: Tab,
    pub percent_complete: u8,
    pub pretest_score: Option<Score>,
    pub posttest_score: Option<Score>,
    /// `None` until the student first opens the course.
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentDetail {
    pub user: User,
    pub progress: ProgressView,
    pub answers: Vec<AnswerLog>,
    pub summary: AnswerSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedOutcome {
    pub created: bool,
    /// The seed password was stored. False when the account already had
    /// one, which is kept.
    pub password_set: bool,
    pub user: User,
}

fn user_write_err(err: StorageError) -> AdminError {
    match err {
        StorageError::Conflict => AdminError::EmailTaken,
        StorageError::NotFound => AdminError::NotFound,
        other => AdminError::Storage(other),
    }
}

fn check_password(password: &str) -> Result<(), AdminError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::WeakPassword {
            min: MIN_PASSWORD_CHARS,
        }
        .into());
    }
    Ok(())
}

/// Role-gated operations behind the admin dashboard. Callers are expected
/// to have passed `AuthService::require_admin`.
#[derive(Clone)]
pub struct AdminService {
    clock: Clock,
    curriculum: Arc<Curriculum>,
    users: Arc<dyn UserRepository>,
    progress_repo: Arc<dyn ProgressRepository>,
    progress: Arc<ProgressService>,
    auth: Arc<AuthService>,
}

impl AdminService {
    #[must_use]
    pub fn new(
        clock: Clock,
        curriculum: Arc<Curriculum>,
        users: Arc<dyn UserRepository>,
        progress_repo: Arc<dyn ProgressRepository>,
        progress: Arc<ProgressService>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            clock,
            curriculum,
            users,
            progress_repo,
            progress,
            auth,
        }
    }

    // ─── Users ─────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `AdminError::Storage` on repository failures.
    pub async fn list_users(&self) -> Result<Vec<User>, AdminError> {
        Ok(self.users.list_users().await?)
    }

    /// # Errors
    ///
    /// Returns `AdminError::NotFound` for unknown ids.
    pub async fn get_user(&self, id: UserId) -> Result<User, AdminError> {
        self.users.get_user(id).await?.ok_or(AdminError::NotFound)
    }

    /// Create an account, optionally with a password.
    ///
    /// # Errors
    ///
    /// Returns `User` for a malformed email or name, `EmailTaken` for
    /// duplicates and `Auth(WeakPassword)` for short passwords.
    pub async fn create_user(&self, req: NewUserRequest) -> Result<User, AdminError> {
        let email = Email::parse(&req.email)?;
        if let Some(password) = req.password.as_deref() {
            check_password(password)?;
        }
        let user = User::new(
            UserId::generate(),
            email,
            req.role,
            req.display_name,
            self.clock.now(),
        )?;
        self.users.insert_user(&user).await.map_err(user_write_err)?;
        if let Some(password) = req.password.as_deref() {
            self.auth.set_password(user.id, password).await?;
        }
        info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Apply a partial update. Changing the role signs the user out
    /// everywhere.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `EmailTaken`, `LastAdmin` when demoting the only
    /// admin, and validation errors for bad fields.
    pub async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, AdminError> {
        let current = self.get_user(id).await?;
        let mut next = current.clone();
        if let Some(email) = patch.email.as_deref() {
            next.email = Email::parse(email)?;
        }
        if let Some(role) = patch.role {
            next.role = role;
        }
        if patch.display_name.is_some() {
            next.display_name = normalize_display_name(patch.display_name)?;
        }
        if let Some(password) = patch.password.as_deref() {
            check_password(password)?;
        }

        let demoting = current.is_admin() && !next.is_admin();
        if demoting && self.users.count_admins().await? <= 1 {
            return Err(AdminError::LastAdmin);
        }

        if next != current {
            self.users.update_user(&next).await.map_err(user_write_err)?;
        }
        if let Some(password) = patch.password.as_deref() {
            self.auth.set_password(id, password).await?;
        }
        if current.role != next.role {
            self.auth.revoke_all(id).await?;
        }
        info!(user_id = %id, role = %next.role, "user updated");
        Ok(next)
    }

    /// Delete an account and everything it owns.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` and `LastAdmin`.
    pub async fn delete_user(&self, id: UserId) -> Result<(), AdminError> {
        let user = self.get_user(id).await?;
        if user.is_admin() && self.users.count_admins().await? <= 1 {
            return Err(AdminError::LastAdmin);
        }
        self.users.delete_user(id).await.map_err(user_write_err)?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    // ─── Students ──────────────────────────────────────────────────────────

    /// Dashboard rows for every student, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Storage` on repository failures.
    pub async fn student_overview(&self) -> Result<Vec<StudentOverview>, AdminError> {
        let users = self.users.list_users().await?;
        let mut stored: HashMap<UserId, StudentProgress> = self
            .progress_repo
            .list_progress()
            .await?
            .into_iter()
            .map(|p| (p.user_id(), p))
            .collect();

        let now = self.clock.now();
        let rows = users
            .into_iter()
            .filter(|u| u.role == Role::Student)
            .map(|user| {
                let saved = stored.remove(&user.id);
                let updated_at = saved.as_ref().map(StudentProgress::updated_at);
                let mut progress = saved
                    .unwrap_or_else(|| StudentProgress::new(user.id, &self.curriculum, now));
                progress.align_with(&self.curriculum);
                StudentOverview {
                    user_id: user.id,
                    email: user.email,
                    display_name: user.display_name,
                    current_tab: progress.current_tab(&self.curriculum),
                    percent_complete: progress.percent_complete(&self.curriculum),
                    pretest_score: progress.pretest().score,
                    posttest_score: progress.posttest().score,
                    updated_at,
                }
            })
            .collect();
        Ok(rows)
    }

    /// Full record of one student.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub async fn student_detail(&self, id: UserId) -> Result<StudentDetail, AdminError> {
        let user = self.get_user(id).await?;
        let mut progress = self
            .progress_repo
            .get_progress(id)
            .await?
            .unwrap_or_else(|| StudentProgress::new(id, &self.curriculum, self.clock.now()));
        progress.align_with(&self.curriculum);
        let answers = self.progress.answers(id).await?;
        Ok(StudentDetail {
            summary: AnswerSummary::from_logs(&answers),
            progress: ProgressView::new(progress, &self.curriculum),
            answers,
            user,
        })
    }

    /// Wipe a student's progress and answer log.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub async fn reset_student(&self, id: UserId) -> Result<ProgressView, AdminError> {
        let user = self.get_user(id).await?;
        if user.is_admin() {
            warn!(user_id = %id, "resetting progress of an admin account");
        }
        let fresh = self.progress.reset(id).await?;
        Ok(ProgressView::new(fresh, &self.curriculum))
    }

    // ─── Seed ──────────────────────────────────────────────────────────────

    /// Make sure an admin account exists for `email`. An existing student
    /// with that email is promoted; an existing admin keeps its role. An
    /// existing account without a password gets `password`, so the seeded
    /// admin can always sign in.
    ///
    /// # Errors
    ///
    /// Returns validation errors for the email or password.
    pub async fn seed(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<SeedOutcome, AdminError> {
        let email = Email::parse(email)?;
        if let Some(existing) = self.users.find_by_email(&email).await? {
            let password_set = !self.auth.has_password(existing.id).await?;
            if password_set {
                self.auth.set_password(existing.id, password).await?;
            }

            let user = if existing.is_admin() {
                info!(user_id = %existing.id, password_set, "seed admin already present");
                existing
            } else {
                let promoted = self
                    .update_user(
                        existing.id,
                        UserPatch {
                            role: Some(Role::Admin),
                            ..UserPatch::default()
                        },
                    )
                    .await?;
                info!(user_id = %promoted.id, password_set, "seed promoted existing account");
                promoted
            };
            return Ok(SeedOutcome {
                created: false,
                password_set,
                user,
            });
        }

        let user = self
            .create_user(NewUserRequest {
                email: email.into(),
                role: Role::Admin,
                display_name,
                password: Some(password.to_owned()),
            })
            .await?;
        Ok(SeedOutcome {
            created: true,
            password_set: true,
            user,
        })
    }
}
