use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use quorum_api::middleware::require_admin;
use quorum_api::state::{AppState, AppStateInner};
use quorum_api::{admin, auth, meetings, sse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quorum=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let secret_key =
        std::env::var("QUORUM_SECRET_KEY").unwrap_or_else(|_| "dev-secret-change-me".into());
    let admin_password =
        std::env::var("QUORUM_ADMIN_PASSWORD").unwrap_or_else(|_| "dev-admin-change-me".into());
    let db_path = std::env::var("QUORUM_DB_PATH").unwrap_or_else(|_| "quorum.db".into());
    let host = std::env::var("QUORUM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("QUORUM_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(quorum_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: one cache, one store, injected everywhere
    let state: AppState = Arc::new(AppStateInner::new(db, &secret_key, &admin_password));

    // Routes
    let public_routes = Router::new()
        .route("/admin/login", post(auth::login))
        .route("/meetings", get(meetings::list_meetings))
        .route("/meetings/{meeting_id}/checkin", post(meetings::check_in))
        .route(
            "/meetings/{meeting_id}/polls/{poll_id}/vote",
            post(meetings::cast_vote),
        )
        .route("/sse/meetings", get(sse::meeting_stream))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/meetings", post(admin::create_meeting))
        .route("/admin/meetings/{meeting_id}", delete(admin::delete_meeting))
        .route("/admin/meetings/{meeting_id}/polls", post(admin::create_poll))
        .route(
            "/admin/meetings/{meeting_id}/polls/{poll_id}",
            delete(admin::delete_poll),
        )
        .route("/admin/cache/stats", get(admin::cache_stats))
        .route("/sse/admin/meetings", get(sse::admin_stream))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Quorum server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
