use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Actuator Router
///
/// GET /actuator/health
/// Liveness probe for load balancers; returns `{"status":"UP"}`.
pub fn actuator_routes() -> Router<AppState> {
    Router::new().route("/actuator/health", get(handlers::health))
}
