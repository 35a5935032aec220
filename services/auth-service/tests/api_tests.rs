//! HTTP tests for the auth service over in-memory stores and bus.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_service::AuthApp;
use auth_service::config::{
    AuthConfig, Config, OutboxConfig, PostgresConfig, PublishMode, RedpandaConfig, ServerConfig,
};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use eventhub_core::outbox::OutboxStore;
use eventhub_core::registration::{RegistrationEvent, VENDOR_REGISTERED_TOPIC};
use eventhub_runtime::metrics::MetricsServer;
use eventhub_testing::{InMemoryEventBus, InMemoryUserStore};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn config(mode: PublishMode) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_timeout: 5,
        },
        postgres: PostgresConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        redpanda: RedpandaConfig {
            brokers: "unused:9092".to_string(),
            producer_timeout_ms: 1000,
        },
        auth: AuthConfig {
            secret_key: "test-secret".to_string(),
            token_ttl_minutes: 60,
        },
        outbox: OutboxConfig {
            mode,
            poll_interval_ms: 50,
            batch_size: 10,
            retention_hours: 168,
        },
    }
}

struct TestApp {
    app: AuthApp,
    router: Router,
    users: InMemoryUserStore,
    bus: InMemoryEventBus,
}

async fn spawn_app(mode: PublishMode) -> TestApp {
    let users = InMemoryUserStore::new();
    let bus = InMemoryEventBus::new();
    let app = AuthApp::assemble(
        &config(mode),
        Arc::new(users.clone()),
        Arc::new(users.clone()),
        Arc::new(bus.clone()),
        Arc::new(MetricsServer::new()),
    );
    app.start().await.unwrap();
    let router = app.router();
    TestApp {
        app,
        router,
        users,
        bus,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register(router: &Router, email: &str, role: Option<&str>) -> (StatusCode, Value) {
    let mut body = json!({ "email": email, "password": "secret123" });
    if let Some(role) = role {
        body["role"] = json!(role);
    }
    send(router, post_json("/v1/auth/register", &body)).await
}

async fn wait_for_published(bus: &InMemoryEventBus, count: usize) -> Vec<RegistrationEvent> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let published = bus.published(VENDOR_REGISTERED_TOPIC);
            if published.len() >= count {
                return published
                    .iter()
                    .map(|e| RegistrationEvent::decode(&e.data).unwrap())
                    .collect();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registration events were not published")
}

#[tokio::test]
async fn health_names_the_service() {
    let t = spawn_app(PublishMode::Outbox).await;
    let (status, body) = send(&t.router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "service": "auth" }));
}

#[tokio::test]
async fn ready_reports_components() {
    let t = spawn_app(PublishMode::Outbox).await;
    let (status, body) = send(&t.router, get("/ready", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));

    t.app.stop().await;
    let (status, body) = send(&t.router, get("/ready", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], json!(false));
}

#[tokio::test]
async fn vendor_registration_is_announced_through_the_outbox() {
    let t = spawn_app(PublishMode::Outbox).await;

    let (status, body) = register(&t.router, "v@test.com", Some("vendor")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "v@test.com");
    assert_eq!(body["role"], "vendor");
    assert!(body.get("password_hash").is_none());

    let user_id = body["id"].as_i64().unwrap();
    let events = wait_for_published(&t.bus, 1).await;
    assert_eq!(events, [RegistrationEvent::new(user_id, "v@test.com")]);
    assert_eq!(t.bus.published(VENDOR_REGISTERED_TOPIC)[0].key.as_deref(), Some(&*user_id.to_string()));
}

#[tokio::test]
async fn direct_mode_publishes_without_an_outbox_row() {
    let t = spawn_app(PublishMode::Direct).await;

    let (status, body) = register(&t.router, "v@test.com", Some("vendor")).await;
    assert_eq!(status, StatusCode::CREATED);

    let events = wait_for_published(&t.bus, 1).await;
    assert_eq!(events[0].user_id, body["id"].as_i64().unwrap());
    assert_eq!(t.users.count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn unavailable_bus_does_not_fail_registration() {
    let t = spawn_app(PublishMode::Outbox).await;
    t.bus.fail_next_publishes(2);

    let (status, _) = register(&t.router, "v@test.com", Some("vendor")).await;
    assert_eq!(status, StatusCode::CREATED);

    // The relay keeps the row and publishes it once the bus accepts again.
    let events = wait_for_published(&t.bus, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].email, "v@test.com");
}

#[tokio::test]
async fn non_vendor_roles_are_not_announced() {
    let t = spawn_app(PublishMode::Outbox).await;

    let (status, body) = register(&t.router, "a@test.com", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "attendee");
    let (status, _) = register(&t.router, "o@test.com", Some("organizer")).await;
    assert_eq!(status, StatusCode::CREATED);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(t.bus.published(VENDOR_REGISTERED_TOPIC).is_empty());
}

#[tokio::test]
async fn registration_validation() {
    let t = spawn_app(PublishMode::Outbox).await;

    let (status, _) = register(&t.router, "v@test.com", Some("vendor")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = register(&t.router, "v@test.com", Some("vendor")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = register(&t.router, "not-an-email", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let short = json!({ "email": "s@test.com", "password": "12345" });
    let (status, _) = send(&t.router, post_json("/v1/auth/register", &short)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = register(&t.router, "r@test.com", Some("superuser")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(t.users.user_count(), 1);
}

#[tokio::test]
async fn login_and_me() {
    let t = spawn_app(PublishMode::Outbox).await;
    let (_, registered) = register(&t.router, "v@test.com", Some("vendor")).await;

    let credentials = json!({ "email": "v@test.com", "password": "secret123" });
    let (status, body) = send(&t.router, post_json("/v1/auth/login", &credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 3600);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = send(&t.router, get("/v1/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me, registered);

    let (status, _) = send(&t.router, get("/v1/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = json!({ "email": "v@test.com", "password": "wrong-password" });
    let (status, _) = send(&t.router, post_json("/v1/auth/login", &wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unknown = json!({ "email": "nobody@test.com", "password": "secret123" });
    let (status, _) = send(&t.router, post_json("/v1/auth/login", &unknown)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn internal_lookups() {
    let t = spawn_app(PublishMode::Outbox).await;
    let (_, registered) = register(&t.router, "v@test.com", Some("vendor")).await;
    let id = registered["id"].as_i64().unwrap();

    let (status, body) = send(&t.router, get(&format!("/v1/users/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, registered);

    let (status, _) = send(&t.router, get("/v1/users/9999", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&t.router, get("/v1/auth/users/search?email=v@test.com", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, registered);

    let (status, _) = send(&t.router, get("/v1/auth/users/search?email=x@test.com", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_is_unavailable() {
    // Direct mode: no relay polling the same store.
    let t = spawn_app(PublishMode::Direct).await;
    t.users.fail_next(1);

    let (status, body) = register(&t.router, "v@test.com", Some("vendor")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}
