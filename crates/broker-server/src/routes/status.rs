//! Aggregate status

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use mediabroker_broker_core::{BrokerContext, BrokerStatus};

pub fn router() -> Router<BrokerContext> {
    Router::new().route("/api/status", get(status))
}

async fn status(State(context): State<BrokerContext>) -> Json<BrokerStatus> {
    Json(context.orchestrator().status().await)
}
