//! Port allocator inspection and reset

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use mediabroker_broker_core::{BrokerContext, PortStatus};

use crate::error::ApiResult;

pub fn router() -> Router<BrokerContext> {
    Router::new()
        .route("/api/ports", get(port_status))
        .route("/api/ports/reset", post(reset_ports))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub previous_counter: u32,
    pub status: PortStatus,
}

async fn port_status(State(context): State<BrokerContext>) -> Json<PortStatus> {
    Json(context.ports().status())
}

async fn reset_ports(
    State(context): State<BrokerContext>,
    body: Option<Json<ResetRequest>>,
) -> ApiResult<Json<ResetResponse>> {
    let force = body.map_or(false, |Json(body)| body.force);
    let previous_counter = context.orchestrator().reset_ports(force)?;
    Ok(Json(ResetResponse {
        previous_counter,
        status: context.ports().status(),
    }))
}
