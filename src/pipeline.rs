//! Request pipeline run ahead of routing.
//!
//! A `Pipeline` is an ordered list of `RequestStage`s. Each stage receives the
//! `RequestContext` produced by the previous one and either returns it (possibly enriched) or
//! rejects the request. Stages know nothing about axum; `run_pipeline` is the only adapter.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{auth::AuthUser, error::ApiError};

/// RequestContext
///
/// The parts of an inbound request the stages look at, plus the identity established so far.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Raw `Authorization` header, if present and valid UTF-8.
    pub authorization: Option<String>,
    pub identity: Option<AuthUser>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            authorization: None,
            identity: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn from_request<B>(request: &axum::http::Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            authorization: request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            identity: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// RequestStage
///
/// One step of the pipeline. Implementations must be safe to run concurrently for independent
/// requests; per-request data lives only in the context.
#[async_trait]
pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, context: RequestContext) -> Result<RequestContext, ApiError>;
}

/// Pipeline
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn RequestStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage; stages run in the order they were added.
    pub fn stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs every stage in order, stopping at the first rejection.
    pub async fn run(&self, mut context: RequestContext) -> Result<RequestContext, ApiError> {
        for stage in &self.stages {
            context = stage.process(context).await.inspect_err(|e| {
                tracing::debug!(stage = stage.name(), rejection = %e, "request rejected");
            })?;
        }
        Ok(context)
    }
}

/// run_pipeline
///
/// axum middleware adapter. Builds the context from the request, runs the pipeline, and either
/// answers with the rejection or forwards the request with the resolved `AuthUser` stored in its
/// extensions.
pub async fn run_pipeline(
    State(pipeline): State<Arc<Pipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = RequestContext::from_request(&request);

    match pipeline.run(context).await {
        Ok(context) => {
            if let Some(user) = context.identity {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        Err(rejection) => rejection.into_response(),
    }
}
