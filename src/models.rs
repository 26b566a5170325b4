use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

/// Primary key of a user; also the `sub` claim of that user's tokens.
pub type UserId = i64;
pub type TopicId = i64;
pub type CourseId = i64;

// --- Core Records (Mapped to Database) ---

/// User
///
/// A forum member as stored in the `users` table. Only the id travels in tokens; the rest is
/// loaded by the authentication filter and by the login handler.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    // bcrypt hash; never serialized.
    pub password_hash: String,
}

/// Course
///
/// Every topic is filed under a course; the listing filter matches on `name`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub category: String,
}

/// TopicStatus
///
/// Lifecycle of a discussion thread. New topics start as `Unanswered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum TopicStatus {
    #[default]
    #[serde(rename = "NAO_RESPONDIDO")]
    Unanswered,
    #[serde(rename = "NAO_SOLUCIONADO")]
    Unsolved,
    #[serde(rename = "SOLUCIONADO")]
    Solved,
    #[serde(rename = "FECHADO")]
    Closed,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Unanswered => "NAO_RESPONDIDO",
            TopicStatus::Unsolved => "NAO_SOLUCIONADO",
            TopicStatus::Solved => "SOLUCIONADO",
            TopicStatus::Closed => "FECHADO",
        }
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NAO_RESPONDIDO" => Ok(TopicStatus::Unanswered),
            "NAO_SOLUCIONADO" => Ok(TopicStatus::Unsolved),
            "SOLUCIONADO" => Ok(TopicStatus::Solved),
            "FECHADO" => Ok(TopicStatus::Closed),
            other => Err(format!("unknown topic status {other:?}")),
        }
    }
}

/// Topic
///
/// A discussion thread as returned by the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub status: TopicStatus,
    pub author_id: Option<UserId>,
    pub course_id: Option<CourseId>,
}

/// Answer
///
/// A reply to a topic, with the author's name already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub author_name: Option<String>,
    pub solution: bool,
}

/// TopicRecord
///
/// A topic together with everything the detail view shows.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRecord {
    pub topic: Topic,
    pub author_name: Option<String>,
    pub answers: Vec<Answer>,
}

/// NewTopic
///
/// Validated, resolved input for `Repository::create_topic`.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub title: String,
    pub message: String,
    pub course_id: CourseId,
    pub author_id: UserId,
}

/// TopicChanges
///
/// Validated input for `Repository::update_topic`. Both fields are replaced.
#[derive(Debug, Clone)]
pub struct TopicChanges {
    pub title: String,
    pub message: String,
}

// --- Request Payloads (Input Schemas) ---

/// LoginForm
///
/// Credentials posted to `POST /auth`. The password is only checked against the stored hash and
/// never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginForm {
    pub email: String,
    #[serde(rename = "senha")]
    pub password: String,
}

/// TopicForm
///
/// Input payload for `POST /topicos`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TopicForm {
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "mensagem", default)]
    pub message: String,
    #[serde(rename = "nomeCurso", default)]
    pub course_name: String,
}

/// UpdateTopicForm
///
/// Input payload for `PUT /topicos/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateTopicForm {
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "mensagem", default)]
    pub message: String,
}

pub const MIN_TITLE_LEN: usize = 5;
pub const MIN_MESSAGE_LEN: usize = 10;

/// FieldError
///
/// One entry of a 400 response body: the offending field (wire name) and what is wrong with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    #[serde(rename = "campo")]
    pub field: String,
    #[serde(rename = "erro")]
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn require_min_len(errors: &mut Vec<FieldError>, field: &str, value: &str, min: usize) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(FieldError::new(field, "must not be empty"));
    } else if len < min {
        errors.push(FieldError::new(
            field,
            format!("length must be at least {min} characters"),
        ));
    }
}

impl TopicForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        require_min_len(&mut errors, "titulo", &self.title, MIN_TITLE_LEN);
        require_min_len(&mut errors, "mensagem", &self.message, MIN_MESSAGE_LEN);
        require_min_len(&mut errors, "nomeCurso", &self.course_name, 1);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl UpdateTopicForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        require_min_len(&mut errors, "titulo", &self.title, MIN_TITLE_LEN);
        require_min_len(&mut errors, "mensagem", &self.message, MIN_MESSAGE_LEN);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn into_changes(self) -> TopicChanges {
        TopicChanges {
            title: self.title.trim().to_string(),
            message: self.message.trim().to_string(),
        }
    }
}

// --- Response Schemas (Output) ---

/// TokenResponse
///
/// Body returned by a successful login. `tipo` is always "Bearer".
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "tipo")]
    pub kind: String,
}

impl TokenResponse {
    pub fn bearer(token: String) -> Self {
        Self {
            token,
            kind: "Bearer".to_string(),
        }
    }
}

/// TopicSummary
///
/// The listing representation of a topic, also returned by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TopicSummary {
    pub id: TopicId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "dataCriacao")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Topic> for TopicSummary {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id,
            title: topic.title.clone(),
            message: topic.message.clone(),
            created_at: topic.created_at,
        }
    }
}

/// AnswerResponse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AnswerResponse {
    pub id: i64,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "dataCriacao")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "nomeAutor")]
    pub author_name: Option<String>,
}

/// TopicDetails
///
/// Body of `GET /topicos/{id}`: the topic, its author, status and every answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TopicDetails {
    pub id: TopicId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "dataCriacao")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "nomeAutor")]
    pub author_name: Option<String>,
    pub status: TopicStatus,
    #[serde(rename = "respostas")]
    pub answers: Vec<AnswerResponse>,
}

impl From<TopicRecord> for TopicDetails {
    fn from(record: TopicRecord) -> Self {
        let TopicRecord {
            topic,
            author_name,
            answers,
        } = record;
        Self {
            id: topic.id,
            title: topic.title,
            message: topic.message,
            created_at: topic.created_at,
            author_name,
            status: topic.status,
            answers: answers
                .into_iter()
                .map(|answer| AnswerResponse {
                    id: answer.id,
                    message: answer.message,
                    created_at: answer.created_at,
                    author_name: answer.author_name,
                })
                .collect(),
        }
    }
}

/// HealthResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
