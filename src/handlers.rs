use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    auth::AuthUser,
    cache::CachedPage,
    error::ApiError,
    extract::{AppJson, AppQuery},
    models::{
        FieldError, HealthResponse, LoginForm, NewTopic, TokenResponse, TopicDetails, TopicForm,
        TopicId, TopicSummary, UpdateTopicForm,
    },
    pagination::{ListingParams, Page},
};

// --- Session ---

/// login
///
/// [Public Route] Exchanges e-mail and password for a bearer token. An unknown e-mail and a wrong
/// password produce the same 400 response.
#[utoipa::path(
    post,
    path = "/auth",
    request_body = LoginForm,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(form): AppJson<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .repo
        .find_user_by_email(form.email.trim())
        .await?
        .ok_or(ApiError::BadCredentials)?;

    // bcrypt blocks; run it off the async workers.
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(form.password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match verified {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::BadCredentials),
        Err(e) => {
            tracing::warn!(user_id = user.id, error = %e, "stored password hash is unreadable");
            return Err(ApiError::BadCredentials);
        }
    }

    let token = state.tokens.issue(user.id)?;
    tracing::info!(user_id = user.id, "token issued");
    Ok(Json(TokenResponse::bearer(token)))
}

// --- Topics ---

/// list_topics
///
/// [Public Route] Lists topics a page at a time, optionally filtered by course name. Pages are
/// served from the listing cache when present; a miss reads the database and fills the cache.
#[utoipa::path(
    get,
    path = "/topicos",
    params(ListingParams),
    responses(
        (status = 200, description = "One page of topics", body = Page<TopicSummary>),
        (status = 400, description = "Invalid paging parameters", body = [FieldError])
    )
)]
pub async fn list_topics(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ListingParams>,
) -> Result<Response, ApiError> {
    let key = params.into_key().map_err(ApiError::ValidationFailed)?;

    if let Some(page) = state.cache.get(&key) {
        tracing::debug!(?key, "topic listing served from cache");
        return Ok(Json(page.as_ref()).into_response());
    }

    let generation = state.cache.generation();
    let topics = state
        .repo
        .find_topics(key.course_name.as_deref(), &key.pageable)
        .await?;
    let page: CachedPage = Arc::new(topics.map(|topic| TopicSummary::from(&topic)));

    state.cache.put_at(generation, key, page.clone());
    Ok(Json(page.as_ref()).into_response())
}

/// get_topic
///
/// [Public Route] Full view of a single topic, including its answers.
#[utoipa::path(
    get,
    path = "/topicos/{id}",
    params(("id" = i64, Path, description = "Topic id")),
    responses(
        (status = 200, description = "Found", body = TopicDetails),
        (status = 404, description = "No such topic")
    )
)]
pub async fn get_topic(
    State(state): State<AppState>,
    Path(id): Path<TopicId>,
) -> Result<Json<TopicDetails>, ApiError> {
    let record = state.repo.find_topic(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(TopicDetails::from(record)))
}

/// create_topic
///
/// [Authenticated Route] Opens a new topic authored by the caller under the named course.
/// Responds 201 with the new topic's location after the listing cache has been cleared.
#[utoipa::path(
    post,
    path = "/topicos",
    request_body = TopicForm,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Created", body = TopicSummary),
        (status = 400, description = "Invalid form", body = [FieldError]),
        (status = 401, description = "Authentication required")
    )
)]
pub async fn create_topic(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppJson(form): AppJson<TopicForm>,
) -> Result<impl IntoResponse, ApiError> {
    form.validate().map_err(ApiError::ValidationFailed)?;

    let course = state
        .repo
        .find_course_by_name(form.course_name.trim())
        .await?
        .ok_or_else(|| {
            ApiError::ValidationFailed(vec![FieldError::new("nomeCurso", "course not found")])
        })?;

    let topic = state
        .repo
        .create_topic(NewTopic {
            title: form.title.trim().to_string(),
            message: form.message.trim().to_string(),
            course_id: course.id,
            author_id: user_id,
        })
        .await?;
    state.cache.invalidate_all();

    tracing::info!(topic_id = topic.id, user_id, "topic created");
    let location = format!("/topicos/{}", topic.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(TopicSummary::from(&topic)),
    ))
}

/// update_topic
///
/// [Authenticated Route] Replaces a topic's title and message.
#[utoipa::path(
    put,
    path = "/topicos/{id}",
    params(("id" = i64, Path, description = "Topic id")),
    request_body = UpdateTopicForm,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated", body = TopicSummary),
        (status = 400, description = "Invalid form", body = [FieldError]),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "No such topic")
    )
)]
pub async fn update_topic(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<TopicId>,
    AppJson(form): AppJson<UpdateTopicForm>,
) -> Result<Json<TopicSummary>, ApiError> {
    form.validate().map_err(ApiError::ValidationFailed)?;

    let topic = state
        .repo
        .update_topic(id, form.into_changes())
        .await?
        .ok_or(ApiError::NotFound)?;
    state.cache.invalidate_all();

    tracing::info!(topic_id = id, user_id, "topic updated");
    Ok(Json(TopicSummary::from(&topic)))
}

/// delete_topic
///
/// [Authenticated Route] Deletes a topic and its answers.
#[utoipa::path(
    delete,
    path = "/topicos/{id}",
    params(("id" = i64, Path, description = "Topic id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deleted"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "No such topic")
    )
)]
pub async fn delete_topic(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<TopicId>,
) -> Result<StatusCode, ApiError> {
    if !state.repo.delete_topic(id).await? {
        return Err(ApiError::NotFound);
    }
    state.cache.invalidate_all();

    tracing::info!(topic_id = id, user_id, "topic deleted");
    Ok(StatusCode::OK)
}

// --- Actuator ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/actuator/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP".to_string(),
    })
}
