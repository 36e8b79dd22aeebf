//! Access token issuance and validation.
//!
//! Access tokens are HS256 JWTs carrying only the user identity. They are
//! stateless: validity depends on the signature, the issuer and the expiry,
//! never on the store. They cannot be revoked before they expire.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;

/// Issuer claim of every access token minted by this service.
pub const ACCESS_TOKEN_ISSUER: &str = "chirpy-access";

/// Prefix of an `Authorization` header carrying an access token.
const BEARER_PREFIX: &str = "Bearer ";

/// JWT claims of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Signs and verifies access tokens with a shared secret.
#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl AccessTokenCodec {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            clock,
        }
    }

    /// Issue a token for `user_id` that expires `ttl_secs` from now.
    ///
    /// A non-positive ttl yields a token that is already expired.
    pub fn issue(&self, user_id: Uuid, ttl_secs: i64) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            iss: ACCESS_TOKEN_ISSUER.to_string(),
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Hashing(format!("failed to sign access token: {e}")))
    }

    /// Validate a token and return the user it was issued for.
    ///
    /// Every rejection is [`AuthError::InvalidToken`]; the reason is only
    /// logged.
    pub fn validate(&self, token: &str) -> Result<Uuid, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked against our own clock below.
        validation.validate_exp = false;
        validation.set_issuer(&[ACCESS_TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let claims = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!(error = %e, "Access token rejected");
                AuthError::InvalidToken
            })?
            .claims;

        if claims.exp <= self.clock.now() {
            debug!(exp = claims.exp, "Access token rejected: expired");
            return Err(AuthError::InvalidToken);
        }

        Uuid::parse_str(&claims.sub).map_err(|_| {
            debug!("Access token rejected: malformed subject");
            AuthError::InvalidToken
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Result<&str, AuthError> {
    let token = header_value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::InvalidToken)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(token)
}
