use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::browser::BrowserDriver;
use crate::server::endpoints::{events, status};
use crate::service::EventsService;

mod endpoints;
mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `service`: The events service shared by every request.
///
/// # Returns
/// The router.
pub fn create_router<D: BrowserDriver>(service: Arc<EventsService<D>>) -> Router {
    let events_router = Router::new()
        .route("/events", get(events::get_events::<D>))
        // Cache management endpoints
        .route("/events/cache_stats", get(events::get_cache_stats::<D>))
        .route(
            "/events/invalidate_cache",
            post(events::invalidate_cache::<D>),
        );

    Router::new()
        .route("/health", get(status::get_health::<D>))
        .merge(events_router)
        .with_state(service)
}
