//! Full session creation

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use mediabroker_broker_core::{BrokerContext, FullSession, MountpointConfig, RoomConfig};

use crate::error::{ApiError, ApiResult};

pub fn router() -> Router<BrokerContext> {
    Router::new().route("/api/sessions", post(create_session))
}

/// Body of `POST /api/sessions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default, deserialize_with = "session_id_from_any")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub room_config: RoomConfig,
    #[serde(default)]
    pub stream_config: MountpointConfig,
}

/// Accept both `"42"` and `42`
fn session_id_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "sessionId must be a string or number, got {}",
            other
        ))),
    }
}

async fn create_session(
    State(context): State<BrokerContext>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<FullSession>> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("sessionId is required"))?;

    let session = context
        .orchestrator()
        .create_full_session(&session_id, request.room_config, request.stream_config)
        .await?;
    Ok(Json(session))
}
