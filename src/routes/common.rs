//! Common routes: health, readiness, version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    connections: BTreeMap<String, &'static str>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// Pings every configured store; 503 when any is unreachable.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let mut connections = BTreeMap::new();
    let mut healthy = true;
    for (name, store) in state.stores.iter() {
        let status = match store.ping().await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::warn!(connection = %name, error = %e, "store ping failed");
                healthy = false;
                "unavailable"
            }
        };
        connections.insert(name.to_string(), status);
    }
    if healthy {
        (StatusCode::OK, Json(ReadyBody { status: "ok", connections }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                connections,
            }),
        )
    }
}

async fn version(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": state.settings.app_name,
        "environment": state.settings.environment,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
