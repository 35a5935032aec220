//! Both services over one in-memory bus: registering a vendor with the auth
//! service yields exactly one vendor record in the vendors service.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use auth_service::AuthApp;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use eventhub_auth::JwtKeys;
use eventhub_core::event_bus::EventBus;
use eventhub_core::identity::{Role, User};
use eventhub_core::registration::{RegistrationEvent, VENDOR_REGISTERED_TOPIC, VENDORS_CONSUMER_GROUP};
use eventhub_runtime::metrics::MetricsServer;
use eventhub_testing::{InMemoryDeadLetterStore, InMemoryEventBus, InMemoryUserStore, InMemoryVendorStore};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use vendors_service::VendorsApp;

const SECRET: &str = "shared-secret";

fn auth_config() -> auth_service::Config {
    use auth_service::config::{
        AuthConfig, Config, OutboxConfig, PostgresConfig, PublishMode, RedpandaConfig, ServerConfig,
    };
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
            secret_key: SECRET.to_string(),
            token_ttl_minutes: 60,
        },
        outbox: OutboxConfig {
            mode: PublishMode::Outbox,
            poll_interval_ms: 20,
            batch_size: 10,
            retention_hours: 168,
        },
    }
}

fn vendors_config() -> vendors_service::Config {
    use vendors_service::config::{
        AuthConfig, Config, PostgresConfig, RedpandaConfig, ServerConfig, SyncConfig,
    };
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
            consumer_group: VENDORS_CONSUMER_GROUP.to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 6000,
        },
        auth: AuthConfig {
            secret_key: SECRET.to_string(),
        },
        sync: SyncConfig {
            max_retries: 3,
            retry_initial_delay_ms: 5,
            retry_max_delay_ms: 20,
            reconnect_delay_ms: 10,
        },
    }
}

struct System {
    auth: AuthApp,
    vendors_app: VendorsApp,
    auth_router: Router,
    vendors_router: Router,
    bus: InMemoryEventBus,
    vendors: InMemoryVendorStore,
}

impl System {
    async fn start() -> Self {
        let bus = InMemoryEventBus::new();
        let users = InMemoryUserStore::new();
        let vendors = InMemoryVendorStore::new();

        let auth = AuthApp::assemble(
            &auth_config(),
            Arc::new(users.clone()),
            Arc::new(users),
            Arc::new(bus.clone()),
            Arc::new(MetricsServer::new()),
        );
        let vendors_app = VendorsApp::assemble(
            &vendors_config(),
            Arc::new(vendors.clone()),
            Arc::new(InMemoryDeadLetterStore::new()),
            Arc::new(bus.for_group(VENDORS_CONSUMER_GROUP)),
            Arc::new(MetricsServer::new()),
        );
        auth.start().await.unwrap();
        vendors_app.start().await.unwrap();

        Self {
            auth_router: auth.router(),
            vendors_router: vendors_app.router(),
            auth,
            vendors_app,
            bus,
            vendors,
        }
    }

    async fn stop(self) {
        self.vendors_app.stop().await;
        self.auth.stop().await;
    }

    async fn register(&self, email: &str, role: &str) -> i64 {
        let body = json!({ "email": email, "password": "secret123", "role": role });
        let (status, body) = send(&self.auth_router, "POST", "/v1/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    async fn login(&self, email: &str) -> String {
        let body = json!({ "email": email, "password": "secret123" });
        let (status, body) = send(&self.auth_router, "POST", "/v1/auth/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    fn consumed(&self) -> usize {
        self.bus
            .for_group(VENDORS_CONSUMER_GROUP)
            .committed_offset(VENDOR_REGISTERED_TOPIC)
    }

    async fn wait_until(&self, what: &str, check: impl Fn(&Self) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(self) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

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

fn admin_token() -> String {
    let admin = User {
        id: 1_000,
        email: "admin@test.com".to_string(),
        password_hash: String::new(),
        role: Role::Admin,
        created_at: Utc::now(),
    };
    JwtKeys::new(SECRET, 60).issue(&admin).unwrap()
}

#[tokio::test]
async fn vendor_registration_creates_one_vendor_record() {
    let system = System::start().await;

    let user_id = system.register("v@test.com", "vendor").await;
    system.wait_until("vendor record", |s| s.vendors.len() == 1).await;

    let records = system.vendors.records();
    assert_eq!(records[0].user_id, Some(user_id.to_string()));
    assert_eq!(records[0].email, "v@test.com");
    assert_eq!(records[0].name, None);
    assert_eq!(records[0].phone, None);

    // The auth token works against the vendors API.
    let token = system.login("v@test.com").await;
    let (status, body) = send(&system.vendors_router, "GET", "/api/vendors/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.to_string());

    system.stop().await;
}

#[tokio::test]
async fn duplicate_delivery_keeps_one_record() {
    let system = System::start().await;

    let user_id = system.register("v@test.com", "vendor").await;
    system.wait_until("first delivery consumed", |s| s.consumed() == 1).await;

    // Same event again, as after a producer retry.
    let event = RegistrationEvent::new(user_id, "v@test.com").to_serialized().unwrap();
    system.bus.publish(VENDOR_REGISTERED_TOPIC, &event).await.unwrap();
    system.wait_until("second delivery consumed", |s| s.consumed() == 2).await;

    assert_eq!(system.vendors.len(), 1);
    system.stop().await;
}

#[tokio::test]
async fn registration_claims_an_admin_placeholder() {
    let system = System::start().await;

    let (status, placeholder) = send(
        &system.vendors_router,
        "POST",
        "/api/vendors",
        Some(&admin_token()),
        Some(json!({ "email": "shop@test.com", "name": "Corner Shop" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placeholder["user_id"], Value::Null);

    let user_id = system.register("shop@test.com", "vendor").await;
    system
        .wait_until("placeholder linked", |s| {
            s.vendors.records().first().is_some_and(|r| r.user_id.is_some())
        })
        .await;

    let records = system.vendors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, placeholder["id"].as_i64().unwrap());
    assert_eq!(records[0].user_id, Some(user_id.to_string()));
    assert_eq!(records[0].name.as_deref(), Some("Corner Shop"));

    system.stop().await;
}

#[tokio::test]
async fn other_roles_do_not_create_vendor_records() {
    let system = System::start().await;

    system.register("a@test.com", "attendee").await;
    system.register("o@test.com", "organizer").await;
    system.register("v@test.com", "vendor").await;
    system.wait_until("vendor consumed", |s| s.consumed() == 1).await;

    let records = system.vendors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].email, "v@test.com");
    system.stop().await;
}
