use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub connections: u32,
    pub idle_connections: u32,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Response {
    let reachable = match state.db.get() {
        Ok(conn) => conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok(),
        Err(e) => {
            tracing::error!("Health check could not get a connection: {}", e);
            false
        }
    };

    let pool = state.db.state();
    let report = HealthReport {
        status: if reachable { "ok" } else { "degraded" },
        database: if reachable { "ok" } else { "unreachable" },
        connections: pool.connections,
        idle_connections: pool.idle_connections,
    };

    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
