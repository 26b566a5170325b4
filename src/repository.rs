use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use thiserror::Error;

use crate::{
    models::{
        Answer, Course, NewTopic, Topic, TopicChanges, TopicId, TopicRecord, TopicStatus, User,
        UserId,
    },
    pagination::{Page, Pageable, SortDirection, SortField},
};

/// RepositoryError
///
/// Failures of the persistence layer. Surfaced to clients as a 500 and never retried.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Repository Trait
///
/// Contract between the HTTP layer and the database. Handlers and the authentication filter only
/// ever see `RepositoryState`, so tests swap in `InMemoryRepository` or their own mocks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    // --- Courses ---
    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RepositoryError>;

    // --- Topics ---
    /// One page of topics, optionally restricted to the course with the given name.
    async fn find_topics(
        &self,
        course_name: Option<&str>,
        pageable: &Pageable,
    ) -> Result<Page<Topic>, RepositoryError>;
    async fn find_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, RepositoryError>;
    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, RepositoryError>;
    /// Returns `None` when no topic has this id.
    async fn update_topic(
        &self,
        id: TopicId,
        changes: TopicChanges,
    ) -> Result<Option<Topic>, RepositoryError>;
    /// Returns whether a topic was deleted.
    async fn delete_topic(&self, id: TopicId) -> Result<bool, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

#[derive(FromRow)]
struct TopicRow {
    id: i64,
    title: String,
    message: String,
    created_at: DateTime<Utc>,
    status: String,
    author_id: Option<i64>,
    course_id: Option<i64>,
}

impl TryFrom<TopicRow> for Topic {
    type Error = RepositoryError;

    fn try_from(row: TopicRow) -> Result<Self, Self::Error> {
        Ok(Topic {
            id: row.id,
            title: row.title,
            message: row.message,
            created_at: row.created_at,
            status: row.status.parse().map_err(RepositoryError::Corrupt)?,
            author_id: row.author_id,
            course_id: row.course_id,
        })
    }
}

#[derive(FromRow)]
struct AnswerRow {
    id: i64,
    message: String,
    created_at: DateTime<Utc>,
    author_name: Option<String>,
    solution: bool,
}

const TOPIC_COLUMNS: &str = "t.id, t.title, t.message, t.created_at, t.status, t.author_id, t.course_id";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL through an sqlx pool. Every method is a single statement, so
/// a returned `Ok` means the write has committed.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RepositoryError> {
        let course =
            sqlx::query_as::<_, Course>("SELECT id, name, category FROM courses WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(course)
    }

    /// find_topics
    ///
    /// Builds the count and page queries with QueryBuilder so the course filter stays a bound
    /// parameter. The ORDER BY column comes from the `SortField` whitelist, never from input.
    async fn find_topics(
        &self,
        course_name: Option<&str>,
        pageable: &Pageable,
    ) -> Result<Page<Topic>, RepositoryError> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM topics t");
        let mut select: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TOPIC_COLUMNS} FROM topics t"));

        if let Some(name) = course_name {
            for builder in [&mut count, &mut select] {
                builder.push(" JOIN courses c ON c.id = t.course_id WHERE c.name = ");
                builder.push_bind(name.to_string());
            }
        }

        select.push(format!(
            " ORDER BY t.{} {}",
            pageable.sort.column(),
            pageable.direction.as_sql()
        ));
        if pageable.sort != SortField::Id {
            select.push(", t.id DESC");
        }
        select.push(" LIMIT ");
        select.push_bind(i64::from(pageable.size));
        select.push(" OFFSET ");
        select.push_bind(i64::try_from(pageable.offset()).unwrap_or(i64::MAX));

        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        let rows = select
            .build_query_as::<TopicRow>()
            .fetch_all(&self.pool)
            .await?;

        let topics = rows
            .into_iter()
            .map(Topic::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(topics, pageable, u64::try_from(total).unwrap_or(0)))
    }

    async fn find_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, TopicRow>(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let author_name = match row.author_id {
            Some(author_id) => {
                sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = $1")
                    .bind(author_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => None,
        };

        let answers = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT a.id, a.message, a.created_at, u.name AS author_name, a.solution
            FROM answers a
            LEFT JOIN users u ON u.id = a.author_id
            WHERE a.topic_id = $1
            ORDER BY a.created_at ASC, a.id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Answer {
            id: row.id,
            message: row.message,
            created_at: row.created_at,
            author_name: row.author_name,
            solution: row.solution,
        })
        .collect();

        Ok(Some(TopicRecord {
            topic: Topic::try_from(row)?,
            author_name,
            answers,
        }))
    }

    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, RepositoryError> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            INSERT INTO topics AS t (title, message, created_at, status, author_id, course_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING t.id, t.title, t.message, t.created_at, t.status, t.author_id, t.course_id
            "#,
        )
        .bind(topic.title)
        .bind(topic.message)
        .bind(Utc::now())
        .bind(TopicStatus::default().as_str())
        .bind(topic.author_id)
        .bind(topic.course_id)
        .fetch_one(&self.pool)
        .await?;
        Topic::try_from(row)
    }

    async fn update_topic(
        &self,
        id: TopicId,
        changes: TopicChanges,
    ) -> Result<Option<Topic>, RepositoryError> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            UPDATE topics AS t SET title = $2, message = $3
            WHERE t.id = $1
            RETURNING t.id, t.title, t.message, t.created_at, t.status, t.author_id, t.course_id
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.message)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Topic::try_from).transpose()
    }

    async fn delete_topic(&self, id: TopicId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-Memory ---

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    courses: Vec<Course>,
    topics: BTreeMap<TopicId, Topic>,
    answers: BTreeMap<TopicId, Vec<Answer>>,
}

/// InMemoryRepository
///
/// `Repository` kept in process memory. Used by the test suites to exercise handlers and the
/// request pipeline without a database. Locks are held only for the duration of a lookup.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: User) -> Self {
        self.write(|state| state.users.push(user));
        self
    }

    pub fn with_course(self, course: Course) -> Self {
        self.write(|state| state.courses.push(course));
        self
    }

    pub fn with_topic(self, topic: Topic) -> Self {
        self.write(|state| {
            state.topics.insert(topic.id, topic);
        });
        self
    }

    pub fn with_answer(self, topic_id: TopicId, answer: Answer) -> Self {
        self.write(|state| state.answers.entry(topic_id).or_default().push(answer));
        self
    }

    /// Removes a user, e.g. to simulate an account deleted after its token was issued.
    pub fn remove_user(&self, id: UserId) {
        self.write(|state| state.users.retain(|user| user.id != id));
    }

    pub fn topic_count(&self) -> usize {
        self.read(|state| state.topics.len())
    }

    fn read<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

fn compare_topics(a: &Topic, b: &Topic, pageable: &Pageable) -> std::cmp::Ordering {
    let ordering = match pageable.sort {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Message => a.message.cmp(&b.message),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    };
    let ordering = match pageable.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };
    ordering.then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.read(|state| state.users.iter().find(|user| user.id == id).cloned()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.read(|state| state.users.iter().find(|user| user.email == email).cloned()))
    }

    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RepositoryError> {
        Ok(self.read(|state| state.courses.iter().find(|course| course.name == name).cloned()))
    }

    async fn find_topics(
        &self,
        course_name: Option<&str>,
        pageable: &Pageable,
    ) -> Result<Page<Topic>, RepositoryError> {
        Ok(self.read(|state| {
            let course_ids: Option<Vec<i64>> = course_name.map(|name| {
                state
                    .courses
                    .iter()
                    .filter(|course| course.name == name)
                    .map(|course| course.id)
                    .collect()
            });

            let mut matching: Vec<&Topic> = state
                .topics
                .values()
                .filter(|topic| match &course_ids {
                    Some(ids) => topic.course_id.is_some_and(|id| ids.contains(&id)),
                    None => true,
                })
                .collect();
            matching.sort_by(|a, b| compare_topics(a, b, pageable));

            let total = matching.len() as u64;
            let offset = usize::try_from(pageable.offset()).unwrap_or(usize::MAX);
            let content = matching
                .into_iter()
                .skip(offset)
                .take(pageable.size as usize)
                .cloned()
                .collect();
            Page::new(content, pageable, total)
        }))
    }

    async fn find_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, RepositoryError> {
        Ok(self.read(|state| {
            state.topics.get(&id).map(|topic| TopicRecord {
                author_name: topic.author_id.and_then(|author_id| {
                    state
                        .users
                        .iter()
                        .find(|user| user.id == author_id)
                        .map(|user| user.name.clone())
                }),
                answers: state.answers.get(&id).cloned().unwrap_or_default(),
                topic: topic.clone(),
            })
        }))
    }

    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, RepositoryError> {
        Ok(self.write(|state| {
            let id = state.topics.keys().next_back().map_or(1, |last| last + 1);
            let created = Topic {
                id,
                title: topic.title,
                message: topic.message,
                created_at: Utc::now(),
                status: TopicStatus::default(),
                author_id: Some(topic.author_id),
                course_id: Some(topic.course_id),
            };
            state.topics.insert(id, created.clone());
            created
        }))
    }

    async fn update_topic(
        &self,
        id: TopicId,
        changes: TopicChanges,
    ) -> Result<Option<Topic>, RepositoryError> {
        Ok(self.write(|state| {
            state.topics.get_mut(&id).map(|topic| {
                topic.title = changes.title;
                topic.message = changes.message;
                topic.clone()
            })
        }))
    }

    async fn delete_topic(&self, id: TopicId) -> Result<bool, RepositoryError> {
        Ok(self.write(|state| {
            state.answers.remove(&id);
            state.topics.remove(&id).is_some()
        }))
    }
}
