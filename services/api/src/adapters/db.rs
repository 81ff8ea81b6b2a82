//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the storage ports from the `core` crate (`DatabaseService`, `UserStore` and
//! `VocabularyStore`). It handles all interactions with the PostgreSQL database
//! using `sqlx`.

use async_trait::async_trait;
use baby_english_core::domain::{
    AgeLevel, Message, Role, ScoreEvent, Session, SessionSummary, TurnRecord, User,
    VocabularyCategory,
};
use baby_english_core::ports::{
    DatabaseService, PortError, PortResult, UserStore, VocabularyStore,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn age_level_from_row(raw: i32) -> PortResult<AgeLevel> {
    AgeLevel::new(raw).map_err(|e| PortError::Unexpected(e.to_string()))
}

fn category_from_row(raw: &str) -> PortResult<VocabularyCategory> {
    raw.parse()
        .map_err(|e: baby_english_core::CoreError| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    age_level: i32,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            age_level: age_level_from_row(self.age_level)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    mission_type: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<Session> {
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            mission: category_from_row(&self.mission_type)?,
        })
    }
}

#[derive(FromRow)]
struct SessionSummaryRecord {
    #[sqlx(flatten)]
    session: SessionRecord,
    message_count: i64,
    total_score: i64,
}
impl SessionSummaryRecord {
    fn to_domain(self) -> PortResult<SessionSummary> {
        Ok(SessionSummary {
            session: self.session.to_domain()?,
            message_count: self.message_count.max(0) as u32,
            total_score: self.total_score.max(0) as u32,
        })
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    session_id: Uuid,
    role: String,
    content: String,
    token_count: Option<i32>,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        let role: Role = self
            .role
            .parse()
            .map_err(|e: baby_english_core::CoreError| PortError::Unexpected(e.to_string()))?;
        Ok(Message {
            id: self.id,
            session_id: self.session_id,
            role,
            content: self.content,
            token_count: self.token_count.map(|t| t.max(0) as u32),
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ScoreRecord {
    id: Uuid,
    session_id: Uuid,
    mission: String,
    target_words: Vec<String>,
    success: bool,
    score: i32,
    created_at: DateTime<Utc>,
}
impl ScoreRecord {
    fn to_domain(self) -> PortResult<ScoreEvent> {
        Ok(ScoreEvent {
            id: self.id,
            session_id: self.session_id,
            mission: category_from_row(&self.mission)?,
            matched_words: self.target_words,
            success: self.success,
            points: self.score.max(0) as u32,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct VocabularyListRecord {
    words: Vec<String>,
}

const SESSION_COLUMNS: &str = "id, user_id, mission_type, started_at, ended_at";

//=========================================================================================
// `VocabularyStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl VocabularyStore for DbAdapter {
    async fn find_words(
        &self,
        category: VocabularyCategory,
        age_level: AgeLevel,
    ) -> PortResult<Vec<String>> {
        let records = sqlx::query_as::<_, VocabularyListRecord>(
            "SELECT words FROM vocabulary_lists \
             WHERE category = $1 AND min_age_level <= $2 AND max_age_level >= $2",
        )
        .bind(category.as_str())
        .bind(age_level.value() as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        if records.is_empty() {
            return Err(PortError::NotFound(format!(
                "No {} vocabulary for age level {}",
                category, age_level
            )));
        }
        Ok(records.into_iter().flat_map(|r| r.words).collect())
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<User> {
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, age_level, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {} not found", user_id)))?;

        record.to_domain()
    }

    async fn update_age_level(&self, user_id: Uuid, age_level: AgeLevel) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, age_level) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET age_level = EXCLUDED.age_level \
             RETURNING id, age_level, created_at",
        )
        .bind(user_id)
        .bind(age_level.value() as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn raise_age_level(&self, user_id: Uuid, age_level: AgeLevel) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, age_level) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE \
             SET age_level = GREATEST(users.age_level, EXCLUDED.age_level) \
             RETURNING id, age_level, created_at",
        )
        .bind(user_id)
        .bind(age_level.value() as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }
}

//=========================================================================================
// Transcript Writes
//=========================================================================================

async fn insert_message(conn: &mut PgConnection, message: Message) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO messages (id, session_id, role, content, token_count, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(message.id)
    .bind(message.session_id)
    .bind(message.role.as_str())
    .bind(message.content)
    .bind(message.token_count.map(|t| t as i32))
    .bind(message.created_at)
    .execute(conn)
    .await
    .map_err(unexpected)?;
    Ok(())
}

async fn insert_score(conn: &mut PgConnection, score: ScoreEvent) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO scores (id, session_id, mission, target_words, success, score, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(score.id)
    .bind(score.session_id)
    .bind(score.mission.as_str())
    .bind(score.matched_words)
    .bind(score.success)
    .bind(score.points as i32)
    .bind(score.created_at)
    .execute(conn)
    .await
    .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_session(
        &self,
        user_id: Uuid,
        mission: VocabularyCategory,
    ) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO sessions (id, user_id, mission_type) VALUES ($1, $2, $3) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(mission.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Session {} not found", session_id)))?;

        record.to_domain()
    }

    async fn end_session(&self, session_id: Uuid) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE sessions SET ended_at = COALESCE(ended_at, NOW()) WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Session {} not found", session_id)))?;

        record.to_domain()
    }

    async fn list_session_summaries(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<SessionSummary>> {
        let records = sqlx::query_as::<_, SessionSummaryRecord>(
            "SELECT s.id, s.user_id, s.mission_type, s.started_at, s.ended_at, \
                (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count, \
                (SELECT COALESCE(SUM(sc.score), 0)::BIGINT \
                   FROM scores sc WHERE sc.session_id = s.id) AS total_score \
             FROM sessions s WHERE s.user_id = $1 \
             ORDER BY s.started_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn count_sessions_for_user(&self, user_id: Uuid) -> PortResult<u32> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(count.max(0) as u32)
    }

    async fn record_turn(&self, record: TurnRecord) -> PortResult<()> {
        // Dropping the transaction without commit rolls every insert back.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        insert_message(&mut tx, record.user_message).await?;
        insert_message(&mut tx, record.assistant_message).await?;
        if let Some(score) = record.score {
            insert_score(&mut tx, score).await?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn get_messages_for_session(&self, session_id: Uuid) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, session_id, role, content, token_count, created_at FROM messages \
             WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_scores_for_session(&self, session_id: Uuid) -> PortResult<Vec<ScoreEvent>> {
        let records = sqlx::query_as::<_, ScoreRecord>(
            "SELECT id, session_id, mission, target_words, success, score, created_at FROM scores \
             WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
