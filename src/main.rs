use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use chat_service::repository::PgConversationStore;
use chat_service::services::directory::PgUserDirectory;
use chat_service::services::media::S3MediaStore;
use chat_service::state::AppState;
use chat_service::websocket::handlers;
use chat_service::{config, db, error, logging};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Embedded migrations are idempotent; a schema mismatch is fatal.
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| error::AppError::StartServer(format!("database migrations failed: {e}")))?;

    let store = Arc::new(PgConversationStore::new(pool.clone()));
    let directory = Arc::new(PgUserDirectory::new(pool.clone()));
    let media = Arc::new(S3MediaStore::from_env(&cfg).await);

    let state = AppState::new(cfg.clone(), store, media, directory);

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(handlers::ws_handler))
        .with_state(state);
    let app = logging::with_http_trace(app);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
