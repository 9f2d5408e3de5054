//! HTTP API.
//!
//! - `state` - Shared services handed to every handler
//! - `auth` - Bearer token extractor
//! - `error` - JSON error responses
//! - `routes` - Handlers, one file per area

pub mod auth;
pub mod error;
pub mod routes;
mod state;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::notify::ws_handler;

pub use auth::AuthUser;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, ChainClients};

/// Build the full HTTP router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.client_origin.as_deref());

    Router::new()
        .route("/", get(routes::system::root))
        .route("/api", get(routes::system::api_index))
        .route("/ws", get(ws_handler))
        .merge(routes::router())
        .fallback(routes::system::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Allow the configured origin, or any origin when none is set.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            warn!("CLIENT_ORIGIN is not a valid header value ({}), allowing any origin", e);
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}
