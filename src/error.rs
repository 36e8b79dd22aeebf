//! Error types for credential operations.
//!
//! [`AuthError`] keeps the precise failure reason so it can be logged and
//! audited. Callers that answer an untrusted client must go through
//! [`AuthError::public`], which collapses every authentication failure into a
//! single [`PublicError::Unauthorized`].

use uuid::Uuid;

/// Errors raised by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with the same unique key already exists.
    #[error("row already exists")]
    Conflict,
    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Internal, fully tagged error for every credential operation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Access token failed signature, issuer, expiry or subject checks.
    #[error("invalid access token")]
    InvalidToken,
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// No session or refresh token matches the presented secret.
    #[error("credential not found")]
    NotFound,
    #[error("credential revoked")]
    Revoked,
    #[error("credential expired")]
    Expired,
    /// An already-consumed refresh token was presented again.
    #[error("refresh token reuse detected for user {user_id}")]
    ReuseDetected { user_id: Uuid },
    /// Unique constraint violation (e.g. email already registered).
    #[error("already exists")]
    Conflict,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password rejected: {0}")]
    WeakPassword(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("entropy source failed: {0}")]
    Entropy(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse error that is safe to hand to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublicError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request")]
    BadRequest,
    #[error("conflict")]
    Conflict,
    #[error("internal server error")]
    Internal,
}

impl PublicError {
    /// HTTP status code the web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PublicError::Unauthorized => 401,
            PublicError::BadRequest => 400,
            PublicError::Conflict => 409,
            PublicError::Internal => 500,
        }
    }
}

impl AuthError {
    /// Map to the caller-visible error.
    ///
    /// Reuse detection is indistinguishable from any other rejected
    /// credential here; infrastructure failures carry no detail.
    pub fn public(&self) -> PublicError {
        match self {
            AuthError::InvalidToken
            | AuthError::InvalidCredentials
            | AuthError::NotFound
            | AuthError::Revoked
            | AuthError::Expired
            | AuthError::ReuseDetected { .. } => PublicError::Unauthorized,
            AuthError::InvalidEmail | AuthError::WeakPassword(_) => PublicError::BadRequest,
            AuthError::Conflict => PublicError::Conflict,
            AuthError::Hashing(_)
            | AuthError::Entropy(_)
            | AuthError::DeadlineExceeded
            | AuthError::Store(_) => PublicError::Internal,
        }
    }

    /// True for failures caused by the presented credential rather than by
    /// the infrastructure.
    pub fn is_auth_failure(&self) -> bool {
        self.public() == PublicError::Unauthorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_collapse_to_unauthorized() {
        let errors = [
            AuthError::InvalidToken,
            AuthError::InvalidCredentials,
            AuthError::NotFound,
            AuthError::Revoked,
            AuthError::Expired,
            AuthError::ReuseDetected {
                user_id: Uuid::new_v4(),
            },
        ];
        for err in errors {
            assert_eq!(err.public(), PublicError::Unauthorized, "{err}");
            assert!(err.is_auth_failure());
        }
    }

    #[test]
    fn test_infrastructure_errors_hide_detail() {
        let err = AuthError::Store(StoreError::Corrupt("bad uuid in row 7".into()));
        let public = err.public();
        assert_eq!(public, PublicError::Internal);
        assert_eq!(public.status_code(), 500);
        assert!(!public.to_string().contains("row 7"));
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_reuse_and_not_found_look_identical_to_clients() {
        let reuse = AuthError::ReuseDetected {
            user_id: Uuid::new_v4(),
        };
        let missing = AuthError::NotFound;
        assert_eq!(reuse.public(), missing.public());
        assert_eq!(reuse.public().to_string(), missing.public().to_string());
    }
}
