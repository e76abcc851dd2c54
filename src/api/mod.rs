pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{routing::get, Router};
use tokio::sync::watch;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{db::Store, mqtt::BridgeState, reading_cache::ReadingCache};
use handlers::ApiDoc;

/// Shared by every handler. The cache is the same one the MQTT bridge writes.
#[derive(Clone)]
pub struct AppState {
    pub cache: ReadingCache,
    pub store: Store,
    pub bridge_state: watch::Receiver<BridgeState>,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/clients/1/data.json", get(handlers::get_latest))
        .route("/clients/1/data/history", get(handlers::get_history))
        .route(
            "/clients/1/data/history/range",
            get(handlers::get_history_range),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
