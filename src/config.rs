//! Immutable configuration for the credential core.

use std::fmt;

use crate::password::MIN_PASSWORD_LENGTH;

/// Lifetime of an access token (1 hour).
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Lifetime of a browser session (2 hours).
pub const SESSION_TTL_SECS: i64 = 2 * 60 * 60;

/// Lifetime of a refresh token (14 days).
pub const REFRESH_TOKEN_TTL_SECS: i64 = 14 * 24 * 60 * 60;

/// Settings fixed at startup and shared read-only by every request.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC key for access tokens
    pub jwt_secret: Vec<u8>,
    pub access_ttl_secs: i64,
    pub session_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub min_password_length: usize,
}

impl AuthConfig {
    /// Default lifetimes with the given signing secret.
    pub fn new(jwt_secret: Vec<u8>) -> Self {
        Self {
            jwt_secret,
            access_ttl_secs: ACCESS_TOKEN_TTL_SECS,
            session_ttl_secs: SESSION_TTL_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_TTL_SECS,
            min_password_length: MIN_PASSWORD_LENGTH,
        }
    }
}

// The secret must never end up in logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("min_password_length", &self.min_password_length)
            .finish()
    }
}
