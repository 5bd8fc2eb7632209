use std::sync::{Arc, OnceLock};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use learn_core::model::{Email, User, UserId};
use serde::Serialize;
use storage::repository::{AuthToken, CredentialRepository, UserRepository};
use tracing::{debug, info};

use crate::Clock;
use crate::error::AuthError;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 12;
const TOKEN_BYTES: usize = 32;

/// Hash a password with Argon2id into a PHC string.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` for short passwords and
/// `AuthError::Hash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::WeakPassword {
            min: MIN_PASSWORD_CHARS,
        });
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check `password` against a stored PHC hash.
///
/// # Errors
///
/// Returns `AuthError::Hash` when the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Hash checked when there is no real one, so unknown accounts cost the
/// same Argon2 work as a wrong password.
fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(b"no account has this password", &salt)
            .map(|hash| hash.to_string())
            .unwrap_or_default()
    })
}

fn new_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// A signed-in bearer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Password login and bearer-token resolution.
#[derive(Clone)]
pub struct AuthService {
    clock: Clock,
    token_ttl: Duration,
    users: Arc<dyn UserRepository>,
    credentials: Arc<dyn CredentialRepository>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        clock: Clock,
        token_ttl: Duration,
        users: Arc<dyn UserRepository>,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Self {
        Self {
            clock,
            token_ttl,
            users,
            credentials,
        }
    }

    /// Hash and store a password for an existing user.
    ///
    /// # Errors
    ///
    /// Returns `WeakPassword`, `Hash`, or `Storage(NotFound)` for unknown
    /// users.
    pub async fn set_password(&self, user_id: UserId, password: &str) -> Result<(), AuthError> {
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))??;
        self.credentials.set_password_hash(user_id, &hash).await?;
        Ok(())
    }

    /// Whether the user can sign in with a password at all.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the lookup fails.
    pub async fn has_password(&self, user_id: UserId) -> Result<bool, AuthError> {
        Ok(self.credentials.password_hash(user_id).await?.is_some())
    }

    /// Exchange email and password for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for an unknown email, a user without a
    /// password, or a wrong password.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user = match Email::parse(email) {
            Ok(email) => self.users.find_by_email(&email).await?,
            Err(_) => None,
        };
        let hash = match &user {
            Some(user) => self.credentials.password_hash(user.id).await?,
            None => None,
        };

        let password = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || match hash {
            Some(hash) => verify_password(&password, &hash),
            None => {
                let _ = verify_password(&password, dummy_hash());
                Ok(false)
            }
        })
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))??;
        let Some(user) = user.filter(|_| matches) else {
            debug!("login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        let issued_at = self.clock.now();
        let token = AuthToken {
            token: new_token(),
            user_id: user.id,
            issued_at,
            expires_at: issued_at + self.token_ttl,
        };
        self.credentials.issue_token(&token).await?;
        info!(user_id = %user.id, role = %user.role, "signed in");

        Ok(Session {
            token: token.token,
            expires_at: token.expires_at,
            user,
        })
    }

    /// Resolve a bearer token to its user.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for unknown, expired or orphaned tokens.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let user_id = self
            .credentials
            .resolve_token(token, self.clock.now())
            .await?
            .ok_or(AuthError::InvalidToken)?;
        self.users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Like `authenticate`, but only admins pass.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` or `Forbidden`.
    pub async fn require_admin(&self, token: &str) -> Result<User, AuthError> {
        let user = self.authenticate(token).await?;
        if !user.is_admin() {
            return Err(AuthError::Forbidden);
        }
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `Storage` on repository failures.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.credentials.revoke_token(token).await?;
        Ok(())
    }

    /// Drop every session of a user, e.g. after a role change.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on repository failures.
    pub async fn revoke_all(&self, user_id: UserId) -> Result<(), AuthError> {
        self.credentials.revoke_tokens_for_user(user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::Role;
    use learn_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    async fn setup(role: Role) -> (InMemoryRepository, AuthService, User) {
        let repo = InMemoryRepository::new();
        let auth = AuthService::new(
            Clock::fixed(fixed_now()),
            Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        let user = User::new(
            UserId::generate(),
            Email::parse("kim@school.test").unwrap(),
            role,
            None,
            fixed_now(),
        )
        .unwrap();
        repo.insert_user(&user).await.unwrap();
        auth.set_password(user.id, "photosynthesis").await.unwrap();
        (repo, auth, user)
    }

    #[test]
    fn hashes_are_salted_and_verify() {
        let a = hash_password("correct-horse").unwrap();
        let b = hash_password("correct-horse").unwrap();
        assert!(a.starts_with("$argon2"));
        assert_ne!(a, b);
        assert!(verify_password("correct-horse", &a).unwrap());
        assert!(!verify_password("wrong-horse", &b).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn missing_accounts_still_pay_for_a_real_verify() {
        let hash = dummy_hash();
        assert!(hash.starts_with("$argon2id$"));
        assert!(std::ptr::eq(hash, dummy_hash()));
        assert!(!verify_password("photosynthesis", hash).unwrap());
    }

    #[test]
    fn short_passwords_are_refused() {
        assert!(matches!(
            hash_password("short"),
            Err(AuthError::WeakPassword { min: 8 })
        ));
    }

    #[tokio::test]
    async fn login_issues_hex_token_that_authenticates() {
        let (_repo, auth, user) = setup(Role::Student).await;

        let session = auth.login(" KIM@school.test ", "photosynthesis").await.unwrap();
        assert_eq!(session.token.len(), TOKEN_BYTES * 2);
        assert!(session.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(session.expires_at, fixed_now() + Duration::hours(12));

        assert_eq!(auth.authenticate(&session.token).await.unwrap(), user);
        assert!(matches!(
            auth.require_admin(&session.token).await,
            Err(AuthError::Forbidden)
        ));

        auth.logout(&session.token).await.unwrap();
        assert!(matches!(
            auth.authenticate(&session.token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn wrong_email_and_wrong_password_look_the_same() {
        let (_repo, auth, _user) = setup(Role::Admin).await;
        assert!(matches!(
            auth.login("kim@school.test", "respiration").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@school.test", "photosynthesis").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
