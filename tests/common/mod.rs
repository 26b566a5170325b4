#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use forum_api::{
    AppConfig, AppState, InMemoryRepository, create_router,
    models::{
        Answer, Course, NewTopic, Topic, TopicChanges, TopicId, TopicRecord, TopicStatus, User,
        UserId,
    },
    pagination::{Page, Pageable},
    repository::{Repository, RepositoryError, RepositoryState},
};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
pub const TEST_PASSWORD: &str = "123456";
pub const STUDENT_ID: UserId = 42;
pub const STUDENT_EMAIL: &str = "aluno@email.com";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.token.secret = TEST_JWT_SECRET.to_string();
    config
}

pub fn student() -> User {
    User {
        id: STUDENT_ID,
        name: "Aluno".to_string(),
        email: STUDENT_EMAIL.to_string(),
        password_hash: bcrypt::hash(TEST_PASSWORD, 4).unwrap(),
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn topic(id: TopicId, title: &str, message: &str, course_id: i64) -> Topic {
    Topic {
        id,
        title: title.to_string(),
        message: message.to_string(),
        created_at: base_time() + Duration::minutes(id),
        status: TopicStatus::Unanswered,
        author_id: Some(STUDENT_ID),
        course_id: Some(course_id),
    }
}

/// Two courses and three topics (ids 1, 2 and 5); topic 1 has one answer.
pub fn seeded_repository() -> InMemoryRepository {
    InMemoryRepository::new()
        .with_user(student())
        .with_course(Course {
            id: 1,
            name: "Spring Boot".to_string(),
            category: "Programação".to_string(),
        })
        .with_course(Course {
            id: 2,
            name: "HTML 5".to_string(),
            category: "Front-end".to_string(),
        })
        .with_topic(topic(1, "Dúvida", "Erro ao criar projeto", 1))
        .with_topic(topic(2, "Dúvida 2", "Projeto não compila", 1))
        .with_topic(topic(5, "Dúvida 3", "Tag HTML", 2))
        .with_answer(
            1,
            Answer {
                id: 1,
                message: "Reinstale as dependências".to_string(),
                created_at: base_time() + Duration::hours(1),
                author_name: Some("Moderador".to_string()),
                solution: false,
            },
        )
}

/// CountingRepository
///
/// Delegates to an `InMemoryRepository` and records how often the topic queries and mutations
/// reached persistence.
pub struct CountingRepository {
    pub inner: InMemoryRepository,
    pub topic_queries: AtomicUsize,
    pub mutations: AtomicUsize,
}

impl CountingRepository {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            topic_queries: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
        }
    }

    pub fn topic_queries(&self) -> usize {
        self.topic_queries.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for CountingRepository {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.find_user_by_id(id).await
    }
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.find_user_by_email(email).await
    }
    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RepositoryError> {
        self.inner.find_course_by_name(name).await
    }
    async fn find_topics(
        &self,
        course_name: Option<&str>,
        pageable: &Pageable,
    ) -> Result<Page<Topic>, RepositoryError> {
        self.topic_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_topics(course_name, pageable).await
    }
    async fn find_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, RepositoryError> {
        self.inner.find_topic(id).await
    }
    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, RepositoryError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.inner.create_topic(topic).await
    }
    async fn update_topic(
        &self,
        id: TopicId,
        changes: TopicChanges,
    ) -> Result<Option<Topic>, RepositoryError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.inner.update_topic(id, changes).await
    }
    async fn delete_topic(&self, id: TopicId) -> Result<bool, RepositoryError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_topic(id).await
    }
}

/// A router wired to a counting in-memory repository.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<CountingRepository>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let repo = Arc::new(CountingRepository::new(seeded_repository()));
        let state = AppState::new(config, repo.clone() as RepositoryState);
        let router = create_router(state.clone());
        Self {
            router,
            state,
            repo,
        }
    }

    pub fn token_for(&self, user_id: UserId) -> String {
        self.state.tokens.issue(user_id).unwrap()
    }

    pub fn student_token(&self) -> String {
        self.token_for(STUDENT_ID)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body: bytes.to_vec(),
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(request(Method::GET, uri, None, None)).await
    }
}

/// Builds a request with an optional bearer token and JSON body.
pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Builds a request whose body is sent as-is with a JSON content type.
pub fn raw_json_request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
