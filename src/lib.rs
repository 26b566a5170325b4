use std::sync::Arc;

use axum::{Router, http::HeaderName, middleware};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Security core: tokens, request pipeline, access policy.
pub mod auth;
pub mod pipeline;
pub mod policy;
pub mod token;

// Listing cache and the data it holds.
pub mod cache;
pub mod models;
pub mod pagination;

// Persistence, HTTP handlers, errors and configuration.
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod repository;

// Module for routing, grouped by resource.
pub mod routes;
use routes::{actuator, auth as session, topics};

// --- Public Re-exports ---

pub use cache::ListingCache;
pub use config::AppConfig;
pub use error::ApiError;
pub use policy::AccessPolicy;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use token::TokenService;

use pipeline::{Pipeline, run_pipeline};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and `ToSchema` models.
/// Served as JSON at `/api-docs/openapi.json` and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::list_topics, handlers::get_topic, handlers::create_topic,
        handlers::update_topic, handlers::delete_topic, handlers::health
    ),
    components(
        schemas(
            models::LoginForm, models::TokenResponse, models::TopicForm, models::UpdateTopicForm,
            models::TopicSummary, models::TopicDetails, models::AnswerResponse,
            models::TopicStatus, models::FieldError, models::HealthResponse,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "forum", description = "Forum topics API")
    )
)]
pub struct ApiDoc;

/// Documents the optional `Authorization: Bearer <jwt>` header as a security scheme.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// Single shared container for every service a handler may need. Cloning is cheap: all
/// members are reference counted or small.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Issues and verifies bearer tokens.
    pub tokens: Arc<TokenService>,
    /// Read-through cache of topic listing pages.
    pub cache: Arc<ListingCache>,
    /// Route access table enforced by the pipeline.
    pub policy: Arc<AccessPolicy>,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

impl AppState {
    /// new
    ///
    /// Assembles the state from configuration and a repository, using the default access policy
    /// and an empty listing cache.
    pub fn new(config: AppConfig, repo: RepositoryState) -> Self {
        Self {
            repo,
            tokens: Arc::new(TokenService::new(&config.token)),
            cache: Arc::new(ListingCache::new(config.cache_capacity)),
            policy: Arc::new(AccessPolicy::forum_defaults()),
            config,
        }
    }

    /// The request pipeline: resolve the caller's identity, then enforce the access policy.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new()
            .stage(auth::Authenticate::new(self.tokens.clone(), self.repo.clone()))
            .stage(policy::Authorize::new(self.policy.clone()))
    }
}

/// create_router
///
/// Assembles the routes, runs the request pipeline ahead of all of them, and wraps the result in
/// the observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let pipeline = Arc::new(state.pipeline());

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(session::auth_routes())
        .merge(topics::topic_routes())
        .merge(actuator::actuator_routes())
        .with_state(state)
        // Applied with `layer`, not `route_layer`, so unmatched paths are authorized too.
        .layer(middleware::from_fn_with_state(pipeline, run_pipeline));

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, carrying method, URI and the `x-request-id` so every log line of
/// the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
