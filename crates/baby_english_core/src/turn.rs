//! crates/baby_english_core/src/turn.rs
//!
//! The chat-turn use case: evaluates one learner message, gets the tutor's reply,
//! records the transcript and feeds the score into the session's progression.

use crate::domain::{Message, Role, ScoreEvent, Session, TurnRecord, User};
use crate::error::{CoreError, CoreResult};
use crate::evaluator::{evaluate, validate_message, Evaluation, EvaluationPolicy};
use crate::ports::{ChatCompletionService, DatabaseService, UserStore};
use crate::progression::{ProgressionTracker, ScoreUpdate};
use crate::vocabulary::VocabularyResolver;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the caller needs to render one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub tokens: u32,
    /// The message evaluated against the mission's vocabulary.
    pub evaluation: Evaluation,
    pub progress: ScoreUpdate,
}

struct SessionProgress {
    tracker: Arc<Mutex<ProgressionTracker>>,
    last_active: Instant,
}

pub struct ChatTurn {
    db: Arc<dyn DatabaseService>,
    users: Arc<dyn UserStore>,
    chat: Arc<dyn ChatCompletionService>,
    resolver: Arc<VocabularyResolver>,
    policy: EvaluationPolicy,
    persist_timeout: Duration,
    /// Trackers untouched for this long are dropped.
    idle_timeout: Duration,
    trackers: DashMap<Uuid, SessionProgress>,
}

impl ChatTurn {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        users: Arc<dyn UserStore>,
        chat: Arc<dyn ChatCompletionService>,
        resolver: Arc<VocabularyResolver>,
        policy: EvaluationPolicy,
        persist_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            db,
            users,
            chat,
            resolver,
            policy,
            persist_timeout,
            idle_timeout,
            trackers: DashMap::new(),
        }
    }

    pub async fn execute(&self, session_id: Uuid, text: &str) -> CoreResult<TurnOutcome> {
        let text = validate_message(text)?;
        let session = self.db.get_session_by_id(session_id).await?;
        if session.is_ended() {
            self.trackers.remove(&session_id);
            return Err(CoreError::SessionEnded(session_id));
        }

        self.evict_idle();
        let user = self.users.get_or_create_user(session.user_id).await?;
        let tracker = self.tracker_for(&session, &user);
        let mut tracker = tracker.lock().await;
        tracker.sync_age_level(user.age_level);
        let age_level = tracker.age_level();

        let allowed = self.resolver.resolve(age_level, None).await;
        self.policy.enforce(&evaluate(text, &allowed))?;

        let targets = self.resolver.resolve(age_level, Some(session.mission)).await;
        let evaluation = evaluate(text, &targets);

        let completion = self.chat.reply(age_level, &allowed, text).await?;

        let score = evaluation.success().then(|| ScoreEvent {
            id: Uuid::new_v4(),
            session_id,
            mission: session.mission,
            matched_words: evaluation.matched.iter().cloned().collect(),
            success: true,
            points: evaluation.points(),
            created_at: Utc::now(),
        });
        self.db
            .record_turn(TurnRecord {
                user_message: Message::new(session_id, Role::User, text),
                assistant_message: Message::new(
                    session_id,
                    Role::Assistant,
                    completion.reply.clone(),
                )
                .with_token_count(completion.total_tokens),
                score,
            })
            .await?;

        let progress = tracker.add_score(evaluation.points()).await;

        info!(
            %session_id,
            matched = evaluation.matched.len(),
            points = evaluation.points(),
            age_level = %progress.age_level,
            "Chat turn completed"
        );

        Ok(TurnOutcome {
            reply: completion.reply,
            tokens: completion.total_tokens,
            evaluation,
            progress,
        })
    }

    /// Marks the session as ended and forgets its progression.
    pub async fn close_session(&self, session_id: Uuid) -> CoreResult<Session> {
        let session = self.db.end_session(session_id).await?;
        if self.trackers.remove(&session_id).is_none() {
            warn!(%session_id, "Closed a session that had no chat turns");
        }
        Ok(session)
    }

    /// Number of sessions currently holding a progression tracker.
    pub fn active_sessions(&self) -> usize {
        self.trackers.len()
    }

    fn evict_idle(&self) {
        let now = Instant::now();
        self.trackers.retain(|session_id, progress| {
            let fresh = now.duration_since(progress.last_active) < self.idle_timeout;
            if !fresh {
                debug!(%session_id, "Dropping idle session tracker");
            }
            fresh
        });
    }

    fn tracker_for(&self, session: &Session, user: &User) -> Arc<Mutex<ProgressionTracker>> {
        let mut progress = self.trackers.entry(session.id).or_insert_with(|| SessionProgress {
            tracker: Arc::new(Mutex::new(ProgressionTracker::new(
                user.id,
                user.age_level,
                Arc::clone(&self.users),
                self.persist_timeout,
            ))),
            last_active: Instant::now(),
        });
        progress.last_active = Instant::now();
        Arc::clone(&progress.tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeLevel, VocabularyCategory};
    use crate::ports::{
        ChatCompletion, MockChatCompletionService, MockDatabaseService, MockUserStore, PortError,
        PortResult,
    };
    use crate::progression::LevelChange;
    use mockall::predicate::*;

    const IDLE: Duration = Duration::from_secs(60);

    fn session(id: Uuid, user_id: Uuid, mission: VocabularyCategory) -> Session {
        Session {
            id,
            user_id,
            started_at: Utc::now(),
            ended_at: None,
            mission,
        }
    }

    fn user(id: Uuid, age: i32) -> User {
        User {
            id,
            age_level: AgeLevel::new(age).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn friendly_chat() -> MockChatCompletionService {
        let mut chat = MockChatCompletionService::new();
        chat.expect_reply().returning(|_, _, _| {
            Ok(ChatCompletion {
                reply: "Yes, red!".to_string(),
                total_tokens: 12,
            })
        });
        chat
    }

    fn chat_turn<U: UserStore + 'static>(
        db: MockDatabaseService,
        users: U,
        chat: MockChatCompletionService,
        strict_mode: bool,
    ) -> ChatTurn {
        ChatTurn::new(
            Arc::new(db),
            Arc::new(users),
            Arc::new(chat),
            Arc::new(VocabularyResolver::builtin()),
            EvaluationPolicy { strict_mode },
            Duration::from_millis(200),
            IDLE,
        )
    }

    #[tokio::test]
    async fn scoring_turn_records_transcript_and_score() {
        let session_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .with(eq(session_id))
            .returning(move |id| Ok(session(id, user_id, VocabularyCategory::Colors)));
        db.expect_record_turn()
            .withf(|record| {
                record.user_message.role == Role::User
                    && record.assistant_message.token_count == Some(12)
                    && record.score.as_ref().is_some_and(|score| {
                        score.points == 10 && score.matched_words == vec!["blue", "red"]
                    })
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut users = MockUserStore::new();
        users
            .expect_get_or_create_user()
            .with(eq(user_id))
            .times(1)
            .returning(|id| Ok(user(id, 0)));

        let turn = chat_turn(db, users, friendly_chat(), false);
        let outcome = turn.execute(session_id, "Red and blue!").await.unwrap();

        assert_eq!(outcome.reply, "Yes, red!");
        assert_eq!(outcome.tokens, 12);
        assert_eq!(outcome.evaluation.points(), 10);
        assert_eq!(outcome.progress.cumulative_score, 10);
    }

    #[tokio::test]
    async fn second_turn_levels_up_with_the_same_tracker() {
        let session_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(move |id| Ok(session(id, user_id, VocabularyCategory::Colors)));
        db.expect_record_turn().returning(|_| Ok(()));

        let mut users = MockUserStore::new();
        users
            .expect_get_or_create_user()
            .times(2)
            .returning(|id| Ok(user(id, 0)));
        users
            .expect_raise_age_level()
            .with(eq(user_id), eq(AgeLevel::new(1).unwrap()))
            .times(1)
            .returning(|id, age| {
                Ok(User {
                    id,
                    age_level: age,
                    created_at: Utc::now(),
                })
            });

        let turn = chat_turn(db, users, friendly_chat(), false);
        turn.execute(session_id, "red").await.unwrap();
        let outcome = turn.execute(session_id, "green").await.unwrap();

        assert_eq!(outcome.progress.cumulative_score, 10);
        assert!(matches!(outcome.progress.change, LevelChange::LeveledUp { .. }));
    }

    #[tokio::test]
    async fn non_matching_turn_saves_no_score() {
        let session_id = Uuid::new_v4();
        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(|id| Ok(session(id, Uuid::new_v4(), VocabularyCategory::Numbers)));
        db.expect_record_turn()
            .withf(|record| record.score.is_none())
            .times(1)
            .returning(|_| Ok(()));

        let mut users = MockUserStore::new();
        users.expect_get_or_create_user().returning(|id| Ok(user(id, 0)));

        let turn = chat_turn(db, users, friendly_chat(), false);
        let outcome = turn.execute(session_id, "red dog").await.unwrap();

        assert!(!outcome.evaluation.success());
        assert_eq!(outcome.progress.change, LevelChange::Unchanged);
    }

    #[tokio::test]
    async fn failed_turn_write_leaves_progress_untouched() {
        let session_id = Uuid::new_v4();
        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(|id| Ok(session(id, Uuid::new_v4(), VocabularyCategory::Colors)));
        let mut seq = mockall::Sequence::new();
        db.expect_record_turn()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(PortError::Unexpected("connection reset".to_string())));
        db.expect_record_turn()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut users = MockUserStore::new();
        users.expect_get_or_create_user().returning(|id| Ok(user(id, 0)));

        let turn = chat_turn(db, users, friendly_chat(), false);

        let failed = turn.execute(session_id, "red").await;
        assert!(matches!(failed, Err(CoreError::Port(PortError::Unexpected(_)))));

        let retried = turn.execute(session_id, "red").await.unwrap();
        assert_eq!(retried.progress.cumulative_score, 5);
        assert_eq!(retried.progress.change, LevelChange::Unchanged);
    }

    #[tokio::test]
    async fn strict_mode_rejects_before_calling_the_model() {
        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(|id| Ok(session(id, Uuid::new_v4(), VocabularyCategory::Colors)));
        db.expect_record_turn().never();

        let mut users = MockUserStore::new();
        users.expect_get_or_create_user().returning(|id| Ok(user(id, 0)));

        let mut chat = MockChatCompletionService::new();
        chat.expect_reply().never();

        let turn = chat_turn(db, users, chat, true);
        let result = turn.execute(Uuid::new_v4(), "red spaceship").await;

        assert!(matches!(
            result,
            Err(CoreError::ForbiddenVocabulary { ref rejected })
                if rejected == &vec!["spaceship".to_string()]
        ));
    }

    #[tokio::test]
    async fn ended_sessions_and_blank_messages_are_rejected() {
        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id().returning(|id| {
            let mut s = session(id, Uuid::new_v4(), VocabularyCategory::Colors);
            s.ended_at = Some(Utc::now());
            Ok(s)
        });

        let turn = chat_turn(db, MockUserStore::new(), MockChatCompletionService::new(), false);

        assert!(matches!(
            turn.execute(Uuid::new_v4(), "red").await,
            Err(CoreError::SessionEnded(_))
        ));
        assert!(matches!(
            turn.execute(Uuid::new_v4(), "  ").await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn unknown_session_surfaces_not_found() {
        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(|id| Err(PortError::NotFound(format!("Session {} not found", id))));

        let turn = chat_turn(db, MockUserStore::new(), MockChatCompletionService::new(), false);
        let result = turn.execute(Uuid::new_v4(), "hello").await;

        assert!(matches!(result, Err(CoreError::Port(PortError::NotFound(_)))));
    }

    #[tokio::test]
    async fn closing_a_session_ends_it() {
        let mut db = MockDatabaseService::new();
        db.expect_end_session().times(1).returning(|id| {
            let mut s = session(id, Uuid::new_v4(), VocabularyCategory::Greetings);
            s.ended_at = Some(Utc::now());
            Ok(s)
        });

        let turn = chat_turn(db, MockUserStore::new(), MockChatCompletionService::new(), false);
        let closed = turn.close_session(Uuid::new_v4()).await.unwrap();
        assert!(closed.is_ended());
    }

    #[tokio::test]
    async fn tracker_is_dropped_once_the_session_is_seen_ended() {
        let session_id = Uuid::new_v4();
        let mut db = MockDatabaseService::new();
        let mut seq = mockall::Sequence::new();
        db.expect_get_session_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(session(id, Uuid::new_v4(), VocabularyCategory::Colors)));
        db.expect_get_session_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| {
                let mut s = session(id, Uuid::new_v4(), VocabularyCategory::Colors);
                s.ended_at = Some(Utc::now());
                Ok(s)
            });
        db.expect_record_turn().returning(|_| Ok(()));

        let mut users = MockUserStore::new();
        users.expect_get_or_create_user().returning(|id| Ok(user(id, 0)));

        let turn = chat_turn(db, users, friendly_chat(), false);
        turn.execute(session_id, "red").await.unwrap();
        assert_eq!(turn.active_sessions(), 1);

        let ended = turn.execute(session_id, "red").await;
        assert!(matches!(ended, Err(CoreError::SessionEnded(_))));
        assert_eq!(turn.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_trackers_are_evicted() {
        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(|id| Ok(session(id, Uuid::new_v4(), VocabularyCategory::Colors)));
        db.expect_record_turn().returning(|_| Ok(()));

        let mut users = MockUserStore::new();
        users.expect_get_or_create_user().returning(|id| Ok(user(id, 0)));

        let turn = chat_turn(db, users, friendly_chat(), false);
        turn.execute(Uuid::new_v4(), "red").await.unwrap();
        assert_eq!(turn.active_sessions(), 1);

        tokio::time::advance(IDLE + Duration::from_secs(1)).await;
        turn.execute(Uuid::new_v4(), "blue").await.unwrap();

        assert_eq!(turn.active_sessions(), 1);
    }

    /// Keeps the stored level in memory with the same monotonic raise as the
    /// database adapter.
    struct InMemoryUserStore {
        level: std::sync::Mutex<AgeLevel>,
    }

    #[async_trait::async_trait]
    impl UserStore for InMemoryUserStore {
        async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<User> {
            let level = *self.level.lock().unwrap();
            Ok(User {
                id: user_id,
                age_level: level,
                created_at: Utc::now(),
            })
        }

        async fn update_age_level(&self, user_id: Uuid, age_level: AgeLevel) -> PortResult<User> {
            *self.level.lock().unwrap() = age_level;
            self.get_or_create_user(user_id).await
        }

        async fn raise_age_level(&self, user_id: Uuid, age_level: AgeLevel) -> PortResult<User> {
            {
                let mut level = self.level.lock().unwrap();
                *level = (*level).max(age_level);
            }
            self.get_or_create_user(user_id).await
        }
    }

    #[tokio::test]
    async fn parallel_sessions_never_lower_the_stored_level() {
        let user_id = Uuid::new_v4();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();

        let mut db = MockDatabaseService::new();
        db.expect_get_session_by_id()
            .returning(move |id| Ok(session(id, user_id, VocabularyCategory::Colors)));
        db.expect_record_turn().returning(|_| Ok(()));

        let users = Arc::new(InMemoryUserStore {
            level: std::sync::Mutex::new(AgeLevel::MIN),
        });
        let turn = ChatTurn::new(
            Arc::new(db),
            users.clone(),
            Arc::new(friendly_chat()),
            Arc::new(VocabularyResolver::builtin()),
            EvaluationPolicy { strict_mode: false },
            Duration::from_millis(200),
            IDLE,
        );

        // Session B starts at level 0.
        turn.execute(session_b, "red").await.unwrap();

        // Session A climbs to level 3, one step per turn.
        for _ in 0..3 {
            turn.execute(session_a, "red blue green yellow").await.unwrap();
        }
        assert_eq!(*users.level.lock().unwrap(), AgeLevel::new(3).unwrap());

        // Session B's score now passes its old threshold but it follows the stored level.
        let outcome = turn.execute(session_b, "red").await.unwrap();

        assert_eq!(outcome.progress.cumulative_score, 10);
        assert_eq!(outcome.progress.age_level, AgeLevel::new(3).unwrap());
        assert_eq!(outcome.progress.change, LevelChange::Unchanged);
        assert_eq!(*users.level.lock().unwrap(), AgeLevel::new(3).unwrap());
    }
}
