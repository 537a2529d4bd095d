//! Route tests against in-process gateways

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use mediabroker_broker_core::{BrokerConfig, BrokerContext};
use mediabroker_gateway_core::testing::FakeGateway;
use mediabroker_gateway_core::{Command, SESSION_NOT_FOUND, STREAMING_PLUGIN, VIDEOROOM_PLUGIN};
use mediabroker_server::build_router;

struct TestApp {
    rooms: Arc<FakeGateway>,
    streams: Arc<FakeGateway>,
    router: Router,
}

async fn app_with(config: BrokerConfig) -> TestApp {
    let rooms = FakeGateway::new();
    let streams = FakeGateway::new();
    let context = BrokerContext::with_transports(config, rooms.clone(), streams.clone()).unwrap();
    context.orchestrator().start().await.unwrap();

    TestApp {
        rooms,
        streams,
        router: build_router(context),
    }
}

async fn app() -> TestApp {
    app_with(BrokerConfig::default()).await
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_create_session() {
    let app = app().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/sessions",
            Some(json!({"sessionId": "42", "roomConfig": {"publishers": 2}})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], "42");
    assert_eq!(body["roomId"], 42);
    assert_eq!(body["endpoints"], json!({"whip": "/whip/endpoint/42", "whep": "/whep/endpoint/42"}));
    assert_eq!(body["ports"], json!({"audioPort": 10002, "videoPort": 10003}));

    let room_body = &app.rooms.message_bodies(VIDEOROOM_PLUGIN)[0];
    assert_eq!(room_body["publishers"], 2);
    assert_eq!(room_body["description"], "Session 42");
}

#[tokio::test]
async fn test_numeric_session_id_accepted() {
    let app = app().await;

    let (status, body) = app
        .call(Method::POST, "/api/sessions", Some(json!({"sessionId": 7})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], "7");
    assert_eq!(body["mountpointId"], 7);
}

#[tokio::test]
async fn test_missing_session_id_is_bad_request() {
    let app = app().await;

    let (status, body) = app.call(Method::POST, "/api/sessions", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "sessionId is required");

    let (status, _) = app
        .call(Method::POST, "/api/sessions", Some(json!({"sessionId": ""})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.rooms.message_bodies(VIDEOROOM_PLUGIN).is_empty());
}

#[tokio::test]
async fn test_exhausted_ports_are_unavailable() {
    let mut config = BrokerConfig::default();
    config.ports.capacity = 1;
    let app = app_with(config).await;

    let (status, _) = app
        .call(Method::POST, "/api/sessions", Some(json!({"sessionId": "1"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::POST, "/api/sessions", Some(json!({"sessionId": "2"})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("exhausted"));
}

#[tokio::test]
async fn test_port_reset_requires_force() {
    let app = app().await;
    app.call(Method::POST, "/api/sessions", Some(json!({"sessionId": "1"})))
        .await;

    let (status, body) = app.call(Method::GET, "/api/ports", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counter"], 1);
    assert_eq!(body["nextPair"], json!({"audioPort": 10004, "videoPort": 10005}));

    let (status, _) = app.call(Method::POST, "/api/ports/reset", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(Method::POST, "/api/ports/reset", Some(json!({"force": true})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previousCounter"], 1);
    assert_eq!(body["status"]["counter"], 0);
}

#[tokio::test]
async fn test_room_routes() {
    let app = app().await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/videoroom/rooms",
            Some(json!({"room": 42, "publishers": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::GET, "/api/videoroom/rooms", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"], "list");

    app.call(Method::GET, "/api/videoroom/rooms/42/exists", None).await;
    app.call(Method::GET, "/api/videoroom/rooms/42/participants", None)
        .await;
    app.call(Method::DELETE, "/api/videoroom/rooms/42", None).await;
    app.call(
        Method::DELETE,
        "/api/videoroom/rooms/43",
        Some(json!({"secret": "other"})),
    )
    .await;

    let bodies = app.rooms.message_bodies(VIDEOROOM_PLUGIN);
    assert_eq!(bodies[0]["publishers"], 2);
    assert_eq!(bodies[0]["bitrate"], 128000);
    assert_eq!(&bodies[2], &json!({"request": "exists", "room": 42}));
    assert_eq!(&bodies[3], &json!({"request": "listparticipants", "room": 42}));
    assert_eq!(
        &bodies[4],
        &json!({"request": "destroy", "room": 42, "secret": "adminpwd"})
    );
    assert_eq!(
        &bodies[5],
        &json!({"request": "destroy", "room": 43, "secret": "other"})
    );
}

#[tokio::test]
async fn test_mountpoint_routes() {
    let app = app().await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/streaming/mountpoints",
            Some(json!({"id": 9, "video": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.call(Method::GET, "/api/streaming/mountpoints", None).await;
    app.call(Method::GET, "/api/streaming/mountpoints/9?secret=s3cret", None)
        .await;
    app.call(Method::DELETE, "/api/streaming/mountpoints/9", None).await;

    let bodies = app.streams.message_bodies(STREAMING_PLUGIN);
    assert_eq!(bodies[0]["media"].as_array().unwrap().len(), 1);
    assert_eq!(&bodies[1], &json!({"request": "list"}));
    assert_eq!(&bodies[2], &json!({"request": "info", "id": 9, "secret": "s3cret"}));
    assert_eq!(
        &bodies[3],
        &json!({"request": "destroy", "id": 9, "secret": "adminpwd"})
    );
}

#[tokio::test]
async fn test_plugin_rejection_is_internal_error() {
    let app = app().await;
    app.rooms.push_reply(
        Command::Message,
        FakeGateway::error_envelope(427, "Room 42 already exists"),
    );

    let (status, body) = app
        .call(Method::POST, "/api/videoroom/rooms", Some(json!({"room": 42})))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Room creation failed: Room 42 already exists");
}

#[tokio::test]
async fn test_session_expiry_asks_for_retry() {
    let app = app().await;
    app.streams.push_reply(
        Command::Message,
        FakeGateway::error_envelope(SESSION_NOT_FOUND, "No such session"),
    );

    let (status, body) = app
        .call(Method::GET, "/api/streaming/mountpoints", None)
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retry"], true);

    let (status, _) = app
        .call(Method::GET, "/api/streaming/mountpoints", None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_reports_each_service() {
    let app = app().await;
    app.call(Method::POST, "/api/sessions", Some(json!({"sessionId": "1"})))
        .await;
    app.streams.set_unreachable(true);

    let (status, body) = app.call(Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["videoRoom"]["status"], "ok");
    assert_eq!(body["streaming"]["status"], "error");
    assert_eq!(body["ports"]["counter"], 1);
    assert_eq!(body["endpoints"]["whip"][0]["locator"], "/whip/endpoint/1");
    assert_eq!(body["endpoints"]["whep"][0]["config"]["mountpoint"], 1);
}

#[tokio::test]
async fn test_bad_path_parameter() {
    let app = app().await;
    let (status, _) = app
        .call(Method::GET, "/api/videoroom/rooms/abc/exists", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
