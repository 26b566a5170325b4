use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::ApiError,
    models::{User, UserId},
    pipeline::{RequestContext, RequestStage},
    repository::RepositoryState,
    token::TokenService,
};

/// AuthUser
///
/// The resolved identity of an authenticated request. Placed in the request extensions by the
/// `Authenticate` stage; handlers take it as an argument to require (and read) the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// AuthUser Extractor
///
/// Reads the identity the pipeline attached. Rejects with 401 when the request is anonymous,
/// which only happens if a handler asks for a user on a route the policy marks public.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Extracts `<token>` from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticate
///
/// First pipeline stage. Turns a valid bearer token into an `AuthUser`, and otherwise leaves the
/// request anonymous: a missing header, a malformed header, a token that fails verification and
/// a token for a user that no longer exists are all treated alike and never rejected here.
pub struct Authenticate {
    tokens: Arc<TokenService>,
    users: RepositoryState,
}

impl Authenticate {
    pub fn new(tokens: Arc<TokenService>, users: RepositoryState) -> Self {
        Self { tokens, users }
    }

    async fn resolve(&self, header_value: &str) -> Option<AuthUser> {
        let token = bearer_token(header_value)?;
        let claims = self.tokens.verify(token).ok()?;
        let user_id = claims.user_id()?;

        match self.users.find_user_by_id(user_id).await {
            Ok(Some(user)) => Some(AuthUser::from(user)),
            Ok(None) => {
                tracing::debug!(user_id, "token subject no longer exists");
                None
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "user lookup failed; continuing anonymously");
                None
            }
        }
    }
}

#[async_trait]
impl RequestStage for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn process(&self, mut context: RequestContext) -> Result<RequestContext, ApiError> {
        if let Some(header_value) = context.authorization.as_deref() {
            context.identity = self.resolve(header_value).await;
        }
        Ok(context)
    }
}
