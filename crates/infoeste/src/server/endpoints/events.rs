//! API endpoints for the event listing and its cache.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::browser::BrowserDriver;
use crate::error::ScrapeError;
use crate::server::types::ApiErrorType;
use crate::service::EventsService;

/// Query parameters for `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// If true, bypass cache and scrape again
    #[serde(default)]
    pub refresh: bool,
}

/// Maps a scrape failure to an HTTP status.
pub(crate) fn status_for(error: &ScrapeError) -> StatusCode {
    match error {
        ScrapeError::StructureInvalid { .. } | ScrapeError::ExtractionEmpty => {
            StatusCode::BAD_GATEWAY
        }
        ScrapeError::NavigationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ScrapeError::SessionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /events
///
/// Query parameters:
/// - `refresh` (optional): Set to `true` to bypass cache
pub async fn get_events<D: BrowserDriver>(
    State(s): State<Arc<EventsService<D>>>,
    Query(params): Query<EventsQuery>,
) -> Response {
    info!("GET /events (refresh={})", params.refresh);

    let result = if params.refresh {
        s.refresh_events().await
    } else {
        s.get_events_snapshot().await
    };

    match result {
        Ok(scraped) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": scraped.events,
                "cachedAt": scraped.scraped_at.to_rfc3339(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to fetch events: {}", e);
            ApiErrorType::from((status_for(&e), "Failed to fetch events", Some(e.to_string())))
                .into_response()
        }
    }
}

/// GET /events/cache_stats
pub async fn get_cache_stats<D: BrowserDriver>(
    State(s): State<Arc<EventsService<D>>>,
) -> Response {
    (StatusCode::OK, Json(s.cache_stats())).into_response()
}

/// POST /events/invalidate_cache
pub async fn invalidate_cache<D: BrowserDriver>(
    State(s): State<Arc<EventsService<D>>>,
) -> Response {
    info!("POST /events/invalidate_cache");
    s.invalidate_cache();

    (StatusCode::OK, Json(json!({ "message": "Cache invalidated" }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeBrowser;
    use crate::dom::fixtures::LISTING_PAGE;
    use crate::service::tests::service;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_events_envelope() {
        let browser = FakeBrowser::new();
        browser.set_listing_html(LISTING_PAGE);
        let state = Arc::new(service(&browser, Duration::from_secs(60)));

        let response = get_events(State(state), Query(EventsQuery::default())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["title"], "Oficinas");
        assert_eq!(body["data"][0]["courses"][0]["vacanciesLeft"], 5);
        assert!(body["cachedAt"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_refresh_query_scrapes_again() {
        let browser = FakeBrowser::new();
        browser.set_listing_html(LISTING_PAGE);
        let state = Arc::new(service(&browser, Duration::from_secs(60)));

        get_events(State(state.clone()), Query(EventsQuery::default())).await;
        get_events(State(state.clone()), Query(EventsQuery { refresh: true })).await;

        assert_eq!(browser.snapshots.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_structural_failure_is_bad_gateway() {
        let browser = FakeBrowser::new();
        let state = Arc::new(service(&browser, Duration::from_secs(60)));

        let response = get_events(State(state), Query(EventsQuery::default())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Failed to fetch events");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("#listaHorarios not found"));
    }

    #[tokio::test]
    async fn test_cache_endpoints() {
        let browser = FakeBrowser::new();
        browser.set_listing_html(LISTING_PAGE);
        let state = Arc::new(service(&browser, Duration::from_secs(60)));
        get_events(State(state.clone()), Query(EventsQuery::default())).await;

        let stats = body_json(get_cache_stats(State(state.clone())).await).await;
        assert_eq!(stats["active_entries"], 1);
        assert_eq!(stats["ttl_secs"], 60);

        let response = invalidate_cache(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.cache_stats().total_entries, 0);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ScrapeError::ExtractionEmpty), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&ScrapeError::timeout("navigating", Duration::from_secs(30))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ScrapeError::SessionUnavailable {
                message: "down".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ScrapeError::Script {
                message: "bad".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
