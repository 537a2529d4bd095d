//! # MediaBroker Server
//!
//! HTTP front end of the media session broker. Routes are thin: they decode
//! the request, call into [`BrokerContext`], and map [`BrokerError`]s to
//! status codes (see [`ApiError`]).
//!
//! [`BrokerError`]: mediabroker_broker_core::BrokerError

pub mod error;
pub mod logging;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mediabroker_broker_core::BrokerContext;

pub use error::{ApiError, ApiResult};

/// Build the HTTP API router
pub fn build_router(context: BrokerContext) -> Router {
    Router::new()
        .merge(routes::videoroom::router())
        .merge(routes::streaming::router())
        .merge(routes::sessions::router())
        .merge(routes::status::router())
        .merge(routes::ports::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(context)
}
