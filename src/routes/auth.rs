use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Session Router
///
/// POST /auth
/// Exchanges credentials for a bearer token. Public in the default policy table.
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth", post(handlers::login))
}
