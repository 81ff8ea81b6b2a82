//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the mobile client and the API server.
//! Field names are camelCase on the wire.

use baby_english_core::domain::{Message, Mission, ScoreEvent, Session, SessionSummary, User};
use baby_english_core::progression::LevelChange;
use baby_english_core::turn::TurnOutcome;
use baby_english_core::vocabulary::Vocabulary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: Uuid,
    pub message: String,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationPayload {
    /// True when the message used at least one of the mission's words.
    pub target_met: bool,
    pub score: u32,
    pub matched_words: Vec<String>,
}

#[derive(Serialize, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpPayload {
    pub from: u8,
    pub to: u8,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub evaluation: EvaluationPayload,
    pub tokens: u32,
    pub age_level: u8,
    pub cumulative_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_up: Option<LevelUpPayload>,
    /// Set when a level-up was earned but could not be saved; the client may retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        let (level_up, warning) = match &outcome.progress.change {
            LevelChange::Unchanged => (None, None),
            LevelChange::LeveledUp { from, to } => (
                Some(LevelUpPayload {
                    from: from.value(),
                    to: to.value(),
                }),
                None,
            ),
            LevelChange::Reverted { attempted, warning } => (
                None,
                Some(format!(
                    "Reached age level {} but it could not be saved: {:?}",
                    attempted, warning
                )),
            ),
        };

        Self {
            evaluation: EvaluationPayload {
                target_met: outcome.evaluation.success(),
                score: outcome.evaluation.points(),
                matched_words: outcome.evaluation.matched.iter().cloned().collect(),
            },
            reply: outcome.reply,
            tokens: outcome.tokens,
            age_level: outcome.progress.age_level.value(),
            cumulative_score: outcome.progress.cumulative_score,
            level_up,
            warning,
        }
    }
}

//=========================================================================================
// Missions
//=========================================================================================

#[derive(Deserialize, Debug, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct MissionsQuery {
    /// Age level used to pick the vocabulary, 0 when omitted.
    pub age_level: Option<i32>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct MissionPayload {
    pub id: String,
    pub name: String,
    pub description: String,
    pub vocabulary: Vec<String>,
}

impl MissionPayload {
    pub fn new(mission: &Mission, vocabulary: Vocabulary) -> Self {
        Self {
            id: mission.id.to_string(),
            name: mission.name.to_string(),
            description: mission.description.to_string(),
            vocabulary: vocabulary.into_iter().collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct MissionsResponse {
    pub missions: Vec<MissionPayload>,
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub age_level: u8,
    pub age_category: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            age_level: user.age_level.value(),
            age_category: user.age_level.category().as_str().to_string(),
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub user_id: Uuid,
    pub age_level: i32,
}

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id: Uuid,
    pub mission_type: String,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub mission_type: String,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            started_at: session.started_at,
            ended_at: session.ended_at,
            mission_type: session.mission.as_str().to_string(),
        }
    }
}

#[derive(Deserialize, Debug, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub user_id: Uuid,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryPayload {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub mission_type: String,
    pub message_count: u32,
    pub total_score: u32,
}

impl From<SessionSummary> for SessionSummaryPayload {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.session.id,
            started_at: summary.session.started_at,
            ended_at: summary.session.ended_at,
            mission_type: summary.session.mission.as_str().to_string(),
            message_count: summary.message_count,
            total_score: summary.total_score,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummaryPayload>,
    pub total_count: u32,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub session_id: Uuid,
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub token_count: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessagePayload {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role.as_str().to_string(),
            content: message.content,
            token_count: message.token_count,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScorePayload {
    pub id: Uuid,
    pub mission: String,
    pub target_words: Vec<String>,
    pub success: bool,
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

impl From<ScoreEvent> for ScorePayload {
    fn from(score: ScoreEvent) -> Self {
        Self {
            id: score.id,
            mission: score.mission.as_str().to_string(),
            target_words: score.matched_words,
            success: score.success,
            score: score.points,
            created_at: score.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub session_id: Uuid,
    pub format: String,
    pub session: SessionResponse,
    pub messages: Vec<MessagePayload>,
    pub scores: Vec<ScorePayload>,
    pub exported_at: DateTime<Utc>,
}
