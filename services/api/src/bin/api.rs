//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{chat_llm::OpenAiChatAdapter, db::DbAdapter},
    config::Config,
    error::ApiError,
    web::{
        chat_handler, create_session_handler, end_session_handler, export_session_handler,
        get_user_handler, list_missions_handler, list_sessions_handler, rest::ApiDoc,
        state::AppState, update_user_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    routing::{get, post},
    Router,
};
use baby_english_core::{
    evaluator::EvaluationPolicy,
    ports::{ChatCompletionService, DatabaseService, UserStore, VocabularyStore},
    turn::ChatTurn,
    vocabulary::{VocabularyCache, VocabularyResolver},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);
    let chat_adapter: Arc<dyn ChatCompletionService> = Arc::new(OpenAiChatAdapter::new(
        openai_client,
        config.chat_model.clone(),
        config.chat_max_tokens,
    ));

    let db: Arc<dyn DatabaseService> = db_adapter.clone();
    let users: Arc<dyn UserStore> = db_adapter.clone();
    let vocabulary_store: Arc<dyn VocabularyStore> = db_adapter;

    // --- 4. Build the Core Use Cases ---
    let vocabulary = Arc::new(VocabularyResolver::new(
        vec![vocabulary_store],
        Arc::new(VocabularyCache::new()),
        config.vocabulary_timeout,
    ));
    let chat_turn = Arc::new(ChatTurn::new(
        db.clone(),
        users.clone(),
        chat_adapter,
        vocabulary.clone(),
        EvaluationPolicy {
            strict_mode: config.strict_vocabulary,
        },
        config.persistence_timeout,
        config.session_idle_timeout,
    ));
    if config.strict_vocabulary {
        info!("Strict vocabulary mode is enabled.");
    }

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db,
        users,
        vocabulary,
        chat_turn,
    });

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route("/chat", post(chat_handler))
        .route("/missions", get(list_missions_handler))
        .route("/users", post(update_user_handler))
        .route("/users/{user_id}", get(get_user_handler))
        .route(
            "/sessions",
            post(create_session_handler).get(list_sessions_handler),
        )
        .route("/sessions/export", post(export_session_handler))
        .route("/sessions/{session_id}/end", post(end_session_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
