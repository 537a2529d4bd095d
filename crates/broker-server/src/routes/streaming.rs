//! Mountpoint routes

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use mediabroker_broker_core::{BrokerContext, MountpointConfig};

use super::SecretBody;
use crate::error::ApiResult;

pub fn router() -> Router<BrokerContext> {
    Router::new()
        .route("/api/streaming/mountpoints", get(list_mountpoints).post(create_mountpoint))
        .route(
            "/api/streaming/mountpoints/:id",
            get(mountpoint_info).delete(destroy_mountpoint),
        )
}

async fn create_mountpoint(
    State(context): State<BrokerContext>,
    Json(config): Json<MountpointConfig>,
) -> ApiResult<Json<Value>> {
    Ok(Json(context.streams().create_mountpoint(config).await?))
}

async fn list_mountpoints(State(context): State<BrokerContext>) -> ApiResult<Json<Value>> {
    Ok(Json(context.streams().list_mountpoints().await?))
}

/// `?secret=` unlocks the private mountpoint fields
async fn mountpoint_info(
    State(context): State<BrokerContext>,
    Path(id): Path<u64>,
    Query(query): Query<SecretBody>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        context
            .streams()
            .mountpoint_info(id, query.secret.as_deref())
            .await?,
    ))
}

async fn destroy_mountpoint(
    State(context): State<BrokerContext>,
    Path(id): Path<u64>,
    body: Option<Json<SecretBody>>,
) -> ApiResult<Json<Value>> {
    let secret = body.and_then(|Json(body)| body.secret);
    Ok(Json(
        context
            .streams()
            .destroy_mountpoint(id, secret.as_deref())
            .await?,
    ))
}
