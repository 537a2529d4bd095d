//! Room routes

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::Value;

use mediabroker_broker_core::{BrokerContext, RoomConfig};

use super::SecretBody;
use crate::error::ApiResult;

pub fn router() -> Router<BrokerContext> {
    Router::new()
        .route("/api/videoroom/rooms", get(list_rooms).post(create_room))
        .route("/api/videoroom/rooms/:room_id", delete(destroy_room))
        .route("/api/videoroom/rooms/:room_id/exists", get(room_exists))
        .route("/api/videoroom/rooms/:room_id/participants", get(list_participants))
}

async fn create_room(
    State(context): State<BrokerContext>,
    Json(config): Json<RoomConfig>,
) -> ApiResult<Json<Value>> {
    Ok(Json(context.rooms().create_room(config).await?))
}

async fn list_rooms(State(context): State<BrokerContext>) -> ApiResult<Json<Value>> {
    Ok(Json(context.rooms().list_rooms().await?))
}

async fn destroy_room(
    State(context): State<BrokerContext>,
    Path(room_id): Path<u64>,
    body: Option<Json<SecretBody>>,
) -> ApiResult<Json<Value>> {
    let secret = body.and_then(|Json(body)| body.secret);
    Ok(Json(
        context
            .rooms()
            .destroy_room(room_id, secret.as_deref())
            .await?,
    ))
}

async fn room_exists(
    State(context): State<BrokerContext>,
    Path(room_id): Path<u64>,
) -> ApiResult<Json<Value>> {
    Ok(Json(context.rooms().room_exists(room_id).await?))
}

async fn list_participants(
    State(context): State<BrokerContext>,
    Path(room_id): Path<u64>,
) -> ApiResult<Json<Value>> {
    Ok(Json(context.rooms().list_participants(room_id).await?))
}
