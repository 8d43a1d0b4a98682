mod maintenance;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use ramp_api::auth::{self, AppState, AppStateInner};
use ramp_api::middleware::require_auth;
use ramp_api::{assignments, flows, notifications};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ramp=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RAMP_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("RAMP_DB_PATH").unwrap_or_else(|_| "ramp.db".into());
    let host = std::env::var("RAMP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RAMP_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let maintenance_interval: u64 = std::env::var("RAMP_MAINTENANCE_INTERVAL_SECS")
        .unwrap_or_else(|_| "3600".into())
        .parse()?;
    let snapshot_retention_days: i64 = std::env::var("RAMP_SNAPSHOT_RETENTION_DAYS")
        .unwrap_or_else(|_| "90".into())
        .parse()?;

    // Init database
    let db = ramp_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner { db, jwt_secret });

    // Storage hygiene in the background
    tokio::spawn(maintenance::run_maintenance_loop(
        state.clone(),
        maintenance_interval,
        snapshot_retention_days,
    ));

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/flows", get(flows::list_flows))
        .route("/flows", post(flows::create_flow))
        .route("/flows/{flow_id}", get(flows::get_flow))
        .route("/flows/{flow_id}", patch(flows::update_flow))
        .route("/flows/{flow_id}", delete(flows::delete_flow))
        .route("/flows/{flow_id}/steps", get(flows::list_steps))
        .route("/flows/{flow_id}/steps", post(flows::create_step))
        .route("/steps/{step_id}", patch(flows::update_step))
        .route("/steps/{step_id}", delete(flows::delete_step))
        .route("/steps/{step_id}/components", post(flows::create_component))
        .route("/components/{component_id}", patch(flows::update_component))
        .route("/components/{component_id}", delete(flows::delete_component))
        .route("/flows/{flow_id}/publish", post(flows::publish_flow))
        .route("/flows/{flow_id}/versions", get(flows::list_versions))
        .route("/versions/{version_id}", delete(flows::delete_version))
        .route("/flows/{flow_id}/assign", post(assignments::assign_flow))
        .route("/assignments/{assignment_id}", get(assignments::get_assignment))
        .route("/assignments/{assignment_id}/start", post(assignments::start))
        .route("/assignments/{assignment_id}/pause", post(assignments::pause))
        .route("/assignments/{assignment_id}/resume", post(assignments::resume))
        .route("/assignments/{assignment_id}/complete", post(assignments::complete))
        .route("/assignments/{assignment_id}/progress", get(assignments::get_progress))
        .route(
            "/assignments/{assignment_id}/components/{component_id}/submit",
            post(assignments::submit),
        )
        .route("/users/me", get(auth::me))
        .route("/users/me/assignments", get(assignments::my_assignments))
        .route("/users/{user_id}/achievements", get(notifications::list_achievements))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .layer(middleware::from_fn(require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Ramp server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
