use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::browser::BrowserDriver;
use crate::service::EventsService;

/// GET /health
///
/// Loads the live page and checks its structure. 503 when the structure
/// check fails or could not run.
pub async fn get_health<D: BrowserDriver>(State(s): State<Arc<EventsService<D>>>) -> Response {
    info!("GET /health");
    let timestamp = Utc::now().to_rfc3339();

    match s.check_health().await {
        Ok(report) => {
            let status = if report.is_valid {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };

            (
                status,
                Json(json!({
                    "success": report.is_valid,
                    "status": if report.is_valid { "healthy" } else { "unhealthy" },
                    "schemaValidation": report,
                    "timestamp": timestamp,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "status": "unhealthy",
                    "error": "Failed to validate page structure",
                    "message": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
                .into_response()
        }
    }
}
