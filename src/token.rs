use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::TokenConfig, models::UserId};

/// Value of the `iss` claim on every token this service signs and accepts.
pub const TOKEN_ISSUER: &str = "API do Fórum da Alura";

/// Claims
///
/// Payload carried inside every bearer token. `sub` is the stringified user id; `iat` and `exp`
/// are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// The user id named by `sub`. Always `Some` for claims returned by `TokenService::verify`.
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok()
    }
}

/// TokenError
///
/// `Invalid` covers every verification failure (malformed input, bad signature,
/// wrong issuer, expiry) so callers cannot tell requesters which check failed.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// TokenService
///
/// Issues and verifies HS256-signed bearer tokens. Stateless: holds only the keys derived from the
/// configured secret and the token lifetime, so a single instance is shared by every request.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expiry is checked in `verify_at` with millisecond precision.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            ttl: config.ttl(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user_id` expiring one TTL from now.
    pub fn issue(&self, user_id: UserId) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    /// issue_at
    ///
    /// Issues a token as if the current time were `now`. `exp` is truncated to whole seconds, so
    /// a token never outlives its TTL but may expire up to one second early. With a TTL close to
    /// one second that leaves almost no usable lifetime, which is why `AppConfig::load` refuses
    /// lifetimes below `MIN_TOKEN_EXPIRATION_MILLIS`.
    pub fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, TokenError> {
        let ttl_millis = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_millis = now.timestamp_millis().saturating_add(ttl_millis);

        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at_millis.div_euclid(1000),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Verifies signature, issuer, subject and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// verify_at
    ///
    /// Verifies `token` as if the current time were `now`. A token is accepted only while
    /// `exp` is strictly in the future.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(kind = ?e.kind(), "token rejected");
                TokenError::Invalid
            })?
            .claims;

        let unexpired = claims
            .exp
            .checked_mul(1000)
            .is_some_and(|exp_millis| exp_millis > now.timestamp_millis());
        if !unexpired {
            tracing::debug!("token rejected: expired");
            return Err(TokenError::Invalid);
        }

        if claims.user_id().is_none() {
            tracing::debug!("token rejected: non-numeric subject");
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }

    /// subject_of
    ///
    /// Returns the user id a token was issued for. Verifies the token first, so it cannot be
    /// used to read the subject of a forged or expired token.
    pub fn subject_of(&self, token: &str) -> Result<UserId, TokenError> {
        self.verify(token)?.user_id().ok_or(TokenError::Invalid)
    }
}
