// Integration tests for the /api/system/v1 connection endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use connection_manager::api::{create_router, ApiState};
use connection_manager::notifier::RecordingPublisher;
use connection_manager::{AdapterCatalog, AdapterSettings, ConnectionRegistry, RetryLimits, WebLoginState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use sysgate::auth::CallerDirectory;
use sysgate::config::{AuthConfig, WebLoginConfig};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    publisher: Arc<RecordingPublisher>,
}

fn create_test_app(auth: AuthConfig) -> TestApp {
    let publisher = Arc::new(RecordingPublisher::new());
    let registry = Arc::new(ConnectionRegistry::new(
        AdapterCatalog::builtin(&AdapterSettings::default()),
        publisher.clone(),
        RetryLimits::default(),
        "https://gateway.example.com",
    ));

    let state = ApiState {
        registry: Arc::clone(&registry),
        callers: Arc::new(CallerDirectory::new(&auth)),
    };
    let weblogin = WebLoginState::new(registry, &WebLoginConfig::default()).unwrap();

    TestApp {
        router: create_router(state, weblogin),
        publisher,
    }
}

fn auth_enabled() -> AuthConfig {
    AuthConfig {
        enabled: true,
        tokens: HashMap::from([
            ("tok-alice".to_string(), "alice".to_string()),
            ("tok-bob".to_string(), "bob".to_string()),
            ("tok-root".to_string(), "root".to_string()),
        ]),
        admin_users: vec!["root".to_string()],
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::String(String::from_utf8_lossy(&body).to_string()))
    };
    (status, value)
}

fn connect_local() -> Option<Value> {
    Some(json!({"systemCode": "LOCAL"}))
}

/// GET /adapters lists the three built-in backends with their schemas.
#[tokio::test]
async fn test_list_adapters() {
    let app = create_test_app(AuthConfig::default());

    let (status, body) = send(&app, request("GET", "/api/system/v1/adapters", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["LOCAL", "IBKR", "TS"]);

    let (status, body) = send(&app, request("GET", "/api/system/v1/adapters/NOPE", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "System not found: NOPE");
}

/// PUT on LOCAL connects at once, GET lists the connection.
#[tokio::test]
async fn test_connect_local_and_list() {
    let app = create_test_app(AuthConfig::default());

    let (status, body) = send(&app, request("PUT", "/api/system/v1/connections/main", None, connect_local())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");
    assert_eq!(body["action"], "none");

    let (status, body) = send(&app, request("GET", "/api/system/v1/connections", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["username"], "default");
    assert_eq!(list[0]["connectionCode"], "main");
    assert_eq!(list[0]["systemCode"], "LOCAL");
    assert_eq!(list[0]["status"], "connected");

    // Connecting again is a no-op
    let (_, body) = send(&app, request("PUT", "/api/system/v1/connections/main", None, connect_local())).await;
    assert_eq!(body["message"], "Already connected");

    let changes = app.publisher.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].system_code, "LOCAL");
}

/// DELETE disconnects; services then answer 409.
#[tokio::test]
async fn test_disconnect_then_service_not_connected() {
    let app = create_test_app(AuthConfig::default());
    send(&app, request("PUT", "/api/system/v1/connections/main", None, connect_local())).await;

    let (status, _) = send(&app, request("DELETE", "/api/system/v1/connections/main", None, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, request("GET", "/api/system/v1/connections/main/accounts", None, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Connection 'main' is not connected");
}

#[tokio::test]
async fn test_unknown_system_and_connection() {
    let app = create_test_app(AuthConfig::default());

    let (status, body) = send(
        &app,
        request("PUT", "/api/system/v1/connections/main", None, Some(json!({"systemCode": "NOPE"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "System not found: NOPE");

    let (status, _) = send(&app, request("DELETE", "/api/system/v1/connections/ghost", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Missing mandatory connect parameters are rejected before any backend call.
#[tokio::test]
async fn test_invalid_parameters() {
    let app = create_test_app(AuthConfig::default());

    let (status, body) = send(
        &app,
        request("PUT", "/api/system/v1/connections/ts", None, Some(json!({"systemCode": "TS"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("missing mandatory parameter"));

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/api/system/v1/connections/ib",
            None,
            Some(json!({"systemCode": "IBKR", "configParams": {"apiUrl": 42}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was registered
    let (_, body) = send(&app, request("GET", "/api/system/v1/connections", None, None)).await;
    assert_eq!(body, json!([]));
}

/// LOCAL has no remote services.
#[tokio::test]
async fn test_service_not_supported_by_local() {
    let app = create_test_app(AuthConfig::default());
    send(&app, request("PUT", "/api/system/v1/connections/main", None, connect_local())).await;

    let (status, body) = send(&app, request("GET", "/api/system/v1/connections/main/roots?filter=ES", None, None)).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert!(body["error"].as_str().unwrap().contains("Local system"));

    let (status, _) = send(
        &app,
        request("GET", "/api/system/v1/connections/main/bars/ESZ4?date=20241201", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_bad_bar_date() {
    let app = create_test_app(AuthConfig::default());
    send(&app, request("PUT", "/api/system/v1/connections/main", None, connect_local())).await;

    let (status, body) = send(
        &app,
        request("GET", "/api/system/v1/connections/main/bars/ESZ4?date=2024-12-01", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("YYYYMMDD"));
}

/// IBKR needs a browser login: the caller gets the gateway's web-login link.
#[tokio::test]
async fn test_connect_ibkr_returns_web_login_url() {
    let app = create_test_app(AuthConfig::default());

    let (status, body) = send(
        &app,
        request("PUT", "/api/system/v1/connections/ib", None, Some(json!({"systemCode": "IBKR"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connecting");
    assert_eq!(body["action"], "open-url");

    let url = body["message"].as_str().unwrap();
    assert!(url.starts_with("https://gateway.example.com/api/system/v1/weblogin/"));
    assert!(url.ends_with("/login"));

    let (_, body) = send(&app, request("GET", "/api/system/v1/connections", None, None)).await;
    assert_eq!(body[0]["status"], "connecting");
}

#[tokio::test]
async fn test_auth_required() {
    let app = create_test_app(auth_enabled());

    let (status, body) = send(&app, request("GET", "/api/system/v1/connections", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization token not provided");

    let (status, _) = send(&app, request("GET", "/api/system/v1/connections", Some("nope"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The adapter catalog is public
    let (status, _) = send(&app, request("GET", "/api/system/v1/adapters", None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

/// Connections are per user; only admins may act for another owner.
#[tokio::test]
async fn test_owner_isolation() {
    let app = create_test_app(auth_enabled());
    send(&app, request("PUT", "/api/system/v1/connections/main", Some("tok-alice"), connect_local())).await;

    let (_, body) = send(&app, request("GET", "/api/system/v1/connections", Some("tok-bob"), None)).await;
    assert_eq!(body, json!([]));

    let (status, _) = send(
        &app,
        request("GET", "/api/system/v1/connections/main/accounts?owner=alice", Some("tok-bob"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin passes the ownership check and reaches the adapter
    let (status, _) = send(
        &app,
        request("GET", "/api/system/v1/connections/main/accounts?owner=alice", Some("tok-root"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, _) = send(&app, request("GET", "/api/system/v1/connections/main/accounts", Some("tok-bob"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
