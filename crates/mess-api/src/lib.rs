//! # mess-api: Axum API Service for the Campus Mess
//!
//! HTTP surface over [`mess_ledger::MessServices`], with optional Postgres
//! write-through.
//!
//! ## API Surface
//!
//! | Prefix                  | Module                     | Access                 |
//! |-------------------------|----------------------------|------------------------|
//! | `/v1/auth/*`            | [`routes::auth`]           | public (logout: any)   |
//! | `/v1/principals/*`      | [`routes::principals`]     | admin or self          |
//! | `/v1/prices/*`          | [`routes::prices`]         | read any, write staff  |
//! | `/v1/menu/*`            | [`routes::menu`]           | read any, write staff  |
//! | `/v1/transactions/*`    | [`routes::transactions`]   | owner or staff         |
//! | `/v1/students/*`        | [`routes::students`]       | owner or staff         |
//! | `/v1/redemptions/*`     | [`routes::redemptions`]    | staff                  |
//! | `/v1/admin/*`           | [`routes::admin`]          | admin                  |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! Cors → TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! Health probes, `/metrics`, registration and login are mounted outside
//! the auth middleware.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod sweeper;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
        sessions: state.services.sessions.clone(),
    };
    let cors = cors_layer(&state.config.cors_allowed_origins);
    let metrics = state.metrics.clone();

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::auth::router())
        .merge(routes::principals::router())
        .merge(routes::prices::router())
        .merge(routes::menu::router())
        .merge(routes::transactions::router())
        .merge(routes::students::router())
        .merge(routes::redemptions::router())
        .merge(routes::admin::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    // Unauthenticated routes.
    let public = Router::new()
        .merge(routes::auth::public_router())
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics));

    Router::new()
        .merge(public)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(metrics))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when in-memory, or when the database answers.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "readiness check failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
        }
    }
    (StatusCode::OK, "ready")
}

/// Prometheus exposition. Falls back to the in-process counters when no
/// recorder was installed.
async fn render_metrics(State(state): State<AppState>) -> String {
    match &state.prometheus {
        Some(handle) => handle.render(),
        None => state.metrics.render(),
    }
}
