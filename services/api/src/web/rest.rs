//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{
    ChatRequest, ChatResponse, CreateSessionRequest, EvaluationPayload, ExportRequest,
    ExportResponse, LevelUpPayload, ListSessionsQuery, MessagePayload, MissionPayload,
    MissionsQuery, MissionsResponse, ScorePayload, SessionResponse, SessionSummaryPayload,
    SessionsResponse, UpdateUserRequest, UserResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use baby_english_core::domain::{AgeLevel, Mission, SessionExport};
use baby_english_core::error::CoreError;
use baby_english_core::ports::PortError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chat_handler,
        list_missions_handler,
        get_user_handler,
        update_user_handler,
        create_session_handler,
        end_session_handler,
        list_sessions_handler,
        export_session_handler,
    ),
    components(
        schemas(
            ChatRequest, ChatResponse, EvaluationPayload, LevelUpPayload,
            MissionPayload, MissionsResponse,
            UserResponse, UpdateUserRequest,
            CreateSessionRequest, SessionResponse, SessionSummaryPayload, SessionsResponse,
            ExportRequest, ExportResponse, MessagePayload, ScorePayload,
        )
    ),
    tags(
        (
            name = "Baby English API",
            description = "Vocabulary-constrained chat for young English learners."
        )
    )
)]
pub struct ApiDoc;

const DEFAULT_PAGE_SIZE: u32 = 10;

//=========================================================================================
// Error Mapping
//=========================================================================================

fn core_error_response(context: &str, e: CoreError) -> (StatusCode, String) {
    let status = match &e {
        CoreError::InvalidAgeLevel(_) | CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CoreError::ForbiddenVocabulary { .. } => StatusCode::FORBIDDEN,
        CoreError::SessionEnded(_) => StatusCode::CONFLICT,
        CoreError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
        CoreError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("{}: {:?}", context, e);
        (status, context.to_string())
    } else {
        warn!("{}: {}", context, e);
        (status, e.to_string())
    }
}

fn port_error_response(context: &str, e: PortError) -> (StatusCode, String) {
    core_error_response(context, CoreError::Port(e))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Send one learner message and receive the tutor's reply with its evaluation.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Message evaluated and answered", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 403, description = "Message uses forbidden vocabulary (strict mode only)"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session has ended"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn chat_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let outcome = app_state
        .chat_turn
        .execute(req.session_id, &req.message)
        .await
        .map_err(|e| core_error_response("Failed to process chat message", e))?;

    Ok(Json(ChatResponse::from(outcome)))
}

/// List the available missions with their vocabulary for an age level.
#[utoipa::path(
    get,
    path = "/missions",
    params(MissionsQuery),
    responses(
        (status = 200, description = "Available missions", body = MissionsResponse),
        (status = 400, description = "Age level out of range")
    )
)]
pub async fn list_missions_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<MissionsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let age_level = match query.age_level {
        Some(raw) => AgeLevel::new(raw).map_err(|e| core_error_response("Invalid age level", e))?,
        None => AgeLevel::MIN,
    };

    let mut missions = Vec::with_capacity(Mission::all().len());
    for mission in Mission::all() {
        let words = app_state
            .vocabulary
            .resolve(age_level, Some(mission.category))
            .await;
        missions.push(MissionPayload::new(mission, words));
    }

    Ok(Json(MissionsResponse { missions }))
}

/// Fetch a learner, creating them at age level 0 on first contact.
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(("user_id" = Uuid, Path, description = "The unique ID of the user.")),
    responses(
        (status = 200, description = "The learner", body = UserResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_user_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = app_state
        .users
        .get_or_create_user(user_id)
        .await
        .map_err(|e| port_error_response("Failed to load user", e))?;

    Ok(Json(UserResponse::from(user)))
}

/// Set a learner's age level.
#[utoipa::path(
    post,
    path = "/users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Age level updated", body = UserResponse),
        (status = 400, description = "Age level out of range"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_user_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let age_level =
        AgeLevel::new(req.age_level).map_err(|e| core_error_response("Invalid age level", e))?;

    let user = app_state
        .users
        .update_age_level(req.user_id, age_level)
        .await
        .map_err(|e| port_error_response("Failed to update user", e))?;

    info!(user_id = %user.id, age_level = %user.age_level, "Age level updated");
    Ok(Json(UserResponse::from(user)))
}

/// Start a chat session for one mission.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 400, description = "Unknown mission"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mission = Mission::find(&req.mission_type).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown mission '{}'", req.mission_type),
        )
    })?;

    let result = async {
        app_state.users.get_or_create_user(req.user_id).await?;
        app_state.db.create_session(req.user_id, mission.category).await
    }
    .await;

    match result {
        Ok(session) => {
            info!(session_id = %session.id, mission = mission.id, "Session started");
            Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
        }
        Err(e) => Err(port_error_response("Failed to create session", e)),
    }
}

/// Close a chat session.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/end",
    params(("session_id" = Uuid, Path, description = "The session to close.")),
    responses(
        (status = 200, description = "Session ended", body = SessionResponse),
        (status = 404, description = "Unknown session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = app_state
        .chat_turn
        .close_session(session_id)
        .await
        .map_err(|e| core_error_response("Failed to end session", e))?;

    Ok(Json(SessionResponse::from(session)))
}

/// List a learner's sessions, most recent first.
#[utoipa::path(
    get,
    path = "/sessions",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "A page of sessions", body = SessionsResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let db = &app_state.db;
    let result = async {
        let summaries = db.list_session_summaries(query.user_id, limit, offset).await?;
        let total_count = db.count_sessions_for_user(query.user_id).await?;
        Ok::<_, PortError>((summaries, total_count))
    }
    .await;

    let (summaries, total_count) =
        result.map_err(|e| port_error_response("Failed to list sessions", e))?;

    Ok(Json(SessionsResponse {
        sessions: summaries.into_iter().map(SessionSummaryPayload::from).collect(),
        total_count,
    }))
}

/// Export a session transcript with its messages and scores.
#[utoipa::path(
    post,
    path = "/sessions/export",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "The session transcript", body = ExportResponse),
        (status = 400, description = "Unsupported export format"),
        (status = 404, description = "Unknown session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn export_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ExportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !req.format.eq_ignore_ascii_case("json") {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Unsupported export format '{}'", req.format),
        ));
    }

    let db = &app_state.db;
    let result = async {
        let session = db.get_session_by_id(req.session_id).await?;
        let messages = db.get_messages_for_session(req.session_id).await?;
        let scores = db.get_scores_for_session(req.session_id).await?;
        Ok::<_, PortError>(SessionExport {
            session,
            messages,
            scores,
            exported_at: Utc::now(),
        })
    }
    .await;

    let export = result.map_err(|e| port_error_response("Failed to export session", e))?;

    Ok(Json(ExportResponse {
        session_id: export.session.id,
        format: "json".to_string(),
        session: SessionResponse::from(export.session),
        messages: export.messages.into_iter().map(MessagePayload::from).collect(),
        scores: export.scores.into_iter().map(ScorePayload::from).collect(),
        exported_at: export.exported_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_http_statuses() {
        let cases = [
            (CoreError::InvalidAgeLevel(19), StatusCode::BAD_REQUEST),
            (CoreError::InvalidInput("empty".to_string()), StatusCode::BAD_REQUEST),
            (
                CoreError::ForbiddenVocabulary {
                    rejected: vec!["dragon".to_string()],
                },
                StatusCode::FORBIDDEN,
            ),
            (CoreError::SessionEnded(Uuid::nil()), StatusCode::CONFLICT),
            (
                CoreError::Port(PortError::NotFound("session".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::Port(PortError::Unexpected("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let (status, _) = core_error_response("test", error);
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn server_errors_hide_internal_details() {
        let (_, body) = core_error_response(
            "Failed to process chat message",
            CoreError::Port(PortError::Unexpected("password=hunter2".to_string())),
        );
        assert_eq!(body, "Failed to process chat message");
    }

    #[test]
    fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let routes = [
            "/chat",
            "/missions",
            "/users",
            "/users/{user_id}",
            "/sessions",
            "/sessions/{session_id}/end",
            "/sessions/export",
        ];
        for path in routes {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
