//! Health check endpoint

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use crate::server::SapporoServer;

/// Health check handler
///
/// Reports the server version and whether the state store answers; 503 when
/// the store is down.
pub async fn health_check(State(server): State<Arc<SapporoServer>>) -> impl IntoResponse {
    debug!("Health check requested");

    let database_status = match server.repos.health.health_check().await {
        Ok(true) => "UP",
        Ok(false) => "DOWN",
        Err(err) => {
            error!(?err, "State store health check failed");
            "DOWN"
        }
    };

    let response = json!({
        "status": if database_status == "UP" { "UP" } else { "DOWN" },
        "version": env!("CARGO_PKG_VERSION"),
        "dependencies": {
            "database": {
                "status": database_status,
                "backend": if server.config.debug { "memory" } else { "postgres" },
            },
        },
    });

    let status = if database_status == "DOWN" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(response))
}
