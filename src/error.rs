use std::error::Error as StdError;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{models::FieldError, repository::RepositoryError, token::TokenError};

/// ApiError
///
/// Every failure a request can end in. Handlers and pipeline stages return it with `?`;
/// `IntoResponse` turns it into the status code and JSON body the client sees.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("resource not found")]
    NotFound,
    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),
    #[error("invalid credentials")]
    BadCredentials,
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ValidationFailed(_) | ApiError::BadCredentials => StatusCode::BAD_REQUEST,
            ApiError::Persistence(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::ValidationFailed(vec![field_error_from(&rejection, "body")])
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::ValidationFailed(vec![field_error_from(&rejection, "query")])
    }
}

/// field_error_from
///
/// Turns an extractor rejection into a `FieldError`. Deserialization failures read as
/// `<field path>: <reason>`; anything without a path (syntax errors, a missing content type) is
/// reported against `fallback`.
fn field_error_from(rejection: &(dyn StdError + 'static), fallback: &str) -> FieldError {
    let detail = rejection
        .source()
        .map_or_else(|| rejection.to_string(), ToString::to_string);

    match detail.split_once(": ") {
        Some((path, reason)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            FieldError::new(path, reason)
        }
        _ => FieldError::new(fallback, detail),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::ValidationFailed(errors) => (status, Json(errors)).into_response(),
            ApiError::Unauthenticated => (
                status,
                [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "error": "authentication required" })),
            )
                .into_response(),
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::BadCredentials => {
                (status, Json(json!({ "error": "invalid credentials" }))).into_response()
            }
            ApiError::Persistence(e) => {
                tracing::error!(error = %e, "persistence failure");
                (status, Json(json!({ "error": "internal server error" }))).into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(%message, "internal failure");
                (status, Json(json!({ "error": "internal server error" }))).into_response()
            }
        }
    }
}
