//! Entry points used by the web layer.
//!
//! [`AuthService`] wires the codec, the session manager and the rotation
//! engine to one store and one clock, and adds the account flows built on
//! them: registration, login, cookie authentication, logout and password
//! change.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{AuthError, StoreError};
use crate::jwt::AccessTokenCodec;
use crate::metrics::AuthCounters;
use crate::password;
use crate::refresh::RefreshRotationEngine;
use crate::session::SessionManager;
use crate::store::{CredentialRecord, CredentialStore, IssuedCredential, NewUser, User};

/// Everything handed to a client after a successful login.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub user_id: Uuid,
    pub access_token: String,
    pub session: IssuedCredential,
    pub refresh: IssuedCredential,
}

/// Credentials minted while authenticating a request whose session had lapsed.
#[derive(Debug, Clone)]
pub struct Renewed {
    pub session: IssuedCredential,
    pub refresh: IssuedCredential,
}

/// Outcome of [`AuthService::authenticate`].
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user_id: Uuid,
    /// Set when the session was replaced; the caller must send these back.
    pub renewed: Option<Renewed>,
}

pub struct AuthService<S> {
    config: AuthConfig,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    counters: Arc<AuthCounters>,
    codec: AccessTokenCodec,
    sessions: SessionManager<S>,
    refresh: RefreshRotationEngine<S>,
}

impl<S: CredentialStore> AuthService<S> {
    pub fn new(config: AuthConfig, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let counters = Arc::new(AuthCounters::new());
        let codec = AccessTokenCodec::new(&config.jwt_secret, clock.clone());
        let sessions = SessionManager::new(
            store.clone(),
            clock.clone(),
            counters.clone(),
            config.session_ttl_secs,
        );
        let refresh = RefreshRotationEngine::new(
            store.clone(),
            clock.clone(),
            counters.clone(),
            config.refresh_ttl_secs,
        );
        Self {
            config,
            store,
            clock,
            counters,
            codec,
            sessions,
            refresh,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn counters(&self) -> &AuthCounters {
        &self.counters
    }

    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    pub fn refresh_tokens(&self) -> &RefreshRotationEngine<S> {
        &self.refresh
    }

    // Password hashing is CPU bound, so it runs off the async workers.

    pub async fn hash_password(&self, plaintext: &str) -> Result<String, AuthError> {
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || password::hash_password(&plaintext))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    pub async fn verify_password(&self, plaintext: &str, hash: &str) -> Result<bool, AuthError> {
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        self.counters.password_verification();
        tokio::task::spawn_blocking(move || password::verify_password(&plaintext, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.codec.issue(user_id, self.config.access_ttl_secs)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Uuid, AuthError> {
        self.codec.validate(token)
    }

    pub async fn create_session(&self, user_id: Uuid) -> Result<IssuedCredential, AuthError> {
        self.sessions.create_session(user_id).await
    }

    pub async fn validate_session(&self, secret: &str) -> Result<CredentialRecord, AuthError> {
        self.sessions.validate_session(secret).await
    }

    pub async fn revoke_session(&self, id: i64) -> Result<bool, AuthError> {
        self.sessions.revoke_session(id).await
    }

    pub async fn issue_refresh_token(&self, user_id: Uuid) -> Result<IssuedCredential, AuthError> {
        self.refresh.issue(user_id).await
    }

    pub async fn rotate_refresh_token(&self, secret: &str) -> Result<IssuedCredential, AuthError> {
        self.refresh.rotate(secret).await
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        self.refresh.revoke_all(user_id).await
    }

    /// Create an account.
    pub async fn register(&self, email: &str, plaintext: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        password::validate_password_strength(plaintext, self.config.min_password_length)?;
        let hashed_password = self.hash_password(plaintext).await?;

        let user = self
            .store
            .insert_user(NewUser {
                id: Uuid::new_v4(),
                email,
                hashed_password,
                created_at: self.clock.now(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict => AuthError::Conflict,
                other => AuthError::Store(other),
            })?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check email and password and issue an access token, a session and a
    /// refresh token.
    ///
    /// An unknown email and a wrong password fail the same way.
    pub async fn login(&self, email: &str, plaintext: &str) -> Result<LoginGrant, AuthError> {
        let user = match self.store.get_user_by_email(email.trim()).await? {
            Some(user) => user,
            None => {
                // Same Argon2 cost as a real account, so response time does
                // not reveal which emails are registered.
                let _ = self
                    .verify_password(plaintext, password::DUMMY_PASSWORD_HASH)
                    .await?;
                self.counters.failed_login();
                debug!("Login rejected: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(plaintext, &user.hashed_password).await? {
            self.counters.failed_login();
            debug!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.issue_access_token(user.id)?;
        let session = self.sessions.create_session(user.id).await?;
        let refresh = self.refresh.issue(user.id).await?;

        self.counters.login();
        info!(user_id = %user.id, "User logged in");
        Ok(LoginGrant {
            user_id: user.id,
            access_token,
            session,
            refresh,
        })
    }

    /// Authenticate a browser request from its cookies.
    ///
    /// An active session is enough. Otherwise the refresh token is rotated
    /// and a new session started; both new secrets are returned in
    /// [`Authenticated::renewed`].
    pub async fn authenticate(
        &self,
        session_secret: Option<&str>,
        refresh_secret: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        if let Some(secret) = session_secret {
            match self.sessions.validate_session(secret).await {
                Ok(record) => {
                    return Ok(Authenticated {
                        user_id: record.user_id,
                        renewed: None,
                    });
                }
                Err(e) if e.is_auth_failure() => {
                    debug!(reason = %e, "Session not usable, trying refresh token");
                }
                Err(e) => return Err(e),
            }
        }

        let refresh_secret = refresh_secret.ok_or(AuthError::NotFound)?;
        let refresh = self.refresh.rotate(refresh_secret).await?;
        let user_id = refresh.record.user_id;
        let session = self.sessions.create_session(user_id).await?;

        Ok(Authenticated {
            user_id,
            renewed: Some(Renewed { session, refresh }),
        })
    }

    /// Revoke whichever of the two credentials is presented.
    pub async fn logout(
        &self,
        session_secret: Option<&str>,
        refresh_secret: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(secret) = session_secret {
            self.sessions.revoke_session_by_secret(secret).await?;
        }
        if let Some(secret) = refresh_secret {
            if self.refresh.revoke(secret).await? {
                debug!("Refresh token revoked on logout");
            }
        }
        Ok(())
    }

    /// Replace a user's password after checking the current one, then revoke
    /// every session and refresh token of the user.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new: &str,
    ) -> Result<u64, AuthError> {
        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !self.verify_password(current, &user.hashed_password).await? {
            debug!(user_id = %user_id, "Password change rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        self.set_password(user_id, new).await
    }

    /// Replace a user's password without checking the old one (operator use),
    /// then revoke every session and refresh token of the user.
    pub async fn set_password(&self, user_id: Uuid, new: &str) -> Result<u64, AuthError> {
        password::validate_password_strength(new, self.config.min_password_length)?;
        let hashed_password = self.hash_password(new).await?;

        match self
            .store
            .update_password_and_revoke_all(user_id, &hashed_password, self.clock.now())
            .await?
        {
            Some(revoked) => {
                self.counters.mass_revocation();
                info!(user_id = %user_id, revoked, "Password changed, all credentials revoked");
                Ok(revoked)
            }
            None => Err(AuthError::NotFound),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self.store.get_user_by_email(email.trim()).await?)
    }
}

/// Run `fut`, failing with [`AuthError::DeadlineExceeded`] if it takes longer
/// than `limit`. The future is dropped on timeout, which rolls back any open
/// store transaction.
pub async fn within<T, F>(limit: Duration, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, "Credential operation timed out");
            Err(AuthError::DeadlineExceeded)
        }
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(AuthError::InvalidEmail),
    }
}
