use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use credvault::core::admin::CredentialAdmin;
use credvault::core::audit_log::MemoryAuditTrail;
use credvault::core::cipher::CredentialCipher;
use credvault::core::mutation::MutationAuditor;
use credvault::core::probe::{ConnectivityProbe, ProbeOutcome, ProbeSet};
use credvault::core::registry::StaticServerRegistry;
use credvault::core::store::MemorySecretStore;
use credvault::core::vault::CredentialVault;
use credvault::http::{self, AppState};
use credvault::models::activity::ActivityKind;
use credvault::models::backend::BackendKind;
use credvault::models::server::ServerConfig;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Succeeds only when the expected password is presented.
struct PasswordProbe(&'static str);

#[async_trait]
impl ConnectivityProbe for PasswordProbe {
    async fn probe(
        &self,
        server: &ServerConfig,
        _username: Option<&str>,
        password: Option<&str>,
    ) -> ProbeOutcome {
        if password == Some(self.0) {
            ProbeOutcome::ok(format!("authenticated to {}", server.address))
        } else {
            ProbeOutcome::failed("authentication rejected")
        }
    }
}

fn app() -> (Router, MemoryAuditTrail) {
    let cipher = CredentialCipher::new(&SecretString::from("http-master".to_string())).unwrap();
    let vault = CredentialVault::new(Arc::new(MemorySecretStore::new()), Arc::new(cipher));
    let trail = MemoryAuditTrail::new();
    let registry = StaticServerRegistry::new(vec![
        ServerConfig::new(1, BackendKind::Kafka, "kafka-1:9092"),
        ServerConfig::new(2, BackendKind::Redis, "cache:6379"),
    ]);
    let probes = ProbeSet::new().with(BackendKind::Kafka, Arc::new(PasswordProbe("hunter2")));
    let admin = CredentialAdmin::new(
        vault,
        MutationAuditor::new(Arc::new(trail.clone())),
        Arc::new(registry),
        probes,
    );
    (http::router(AppState::new(admin)), trail)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: &'static str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn add_kafka(app: &Router) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/credentials",
        Some(json!({
            "serverId": 1,
            "serverKind": "Kafka",
            "username": "admin",
            "password": "hunter2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body.as_i64().unwrap()
}

#[tokio::test]
async fn metadata_never_contains_secrets() {
    let (app, _trail) = app();
    let id = add_kafka(&app).await;

    let (status, body) = send(&app, "GET", "/credentials/1/Kafka", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(id));
    assert_eq!(body["serverId"], json!(1));
    assert_eq!(body["serverKind"], json!("Kafka"));
    assert_eq!(body["hasCredentials"], json!(true));
    assert!(body.get("createdAt").is_some());
    assert_eq!(body["lastUsedAt"], Value::Null);

    let raw = body.to_string();
    assert!(!raw.contains("hunter2"));
    assert!(body.get("username").is_none());
    assert!(body.get("password").is_none());
    assert!(body.get("extraConfig").is_none());
}

#[tokio::test]
async fn missing_metadata_is_404() {
    let (app, _trail) = app();
    let (status, body) = send(&app, "GET", "/credentials/9/Redis", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}

#[tokio::test]
async fn duplicate_add_is_conflict() {
    let (app, trail) = app();
    add_kafka(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/credentials",
        Some(json!({"serverId": 1, "serverKind": "kafka", "password": "other"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("conflict"));
    assert!(!body.to_string().contains("other"));
    assert_eq!(trail.entries().len(), 1);
}

#[tokio::test]
async fn unknown_kind_is_bad_request() {
    let (app, _trail) = app();
    let (status, body) = send(&app, "GET", "/credentials/1/Mongo", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn missing_field_is_bad_request() {
    let (app, trail) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/credentials",
        Some(json!({"serverKind": "Kafka", "password": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
    assert!(!body.to_string().contains("hunter2"));
    assert!(trail.entries().is_empty());
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (app, _trail) = app();
    let (status, body) =
        send_raw(&app, "POST", "/credentials", r#"{"serverId": 1, "password": "hunt"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
    assert!(!body.to_string().contains("hunt"));

    let (status, body) = send_raw(&app, "POST", "/credentials/test", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn missing_content_type_is_bad_request() {
    let (app, _trail) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/credentials")
        .body(Body::from(r#"{"serverId": 1, "serverKind": "Kafka"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_numeric_id_is_bad_request() {
    let (app, _trail) = app();
    let (status, body) = send(
        &app,
        "PUT",
        "/credentials/abc",
        Some(json!({"password": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, body) = send(&app, "DELETE", "/credentials/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, _) = send(&app, "GET", "/credentials/one/Kafka", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_and_delete_report_existence() {
    let (app, trail) = app();
    let id = add_kafka(&app).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/credentials/{}", id),
        Some(json!({"password": "rotated"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));

    let (_, body) = send(&app, "PUT", "/credentials/999", Some(json!({"password": "x"}))).await;
    assert_eq!(body, json!(false));

    let (_, body) = send(&app, "DELETE", &format!("/credentials/{}", id), None).await;
    assert_eq!(body, json!(true));
    let (_, body) = send(&app, "DELETE", &format!("/credentials/{}", id), None).await;
    assert_eq!(body, json!(false));

    let (status, _) = send(&app, "GET", "/credentials/1/Kafka", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let kinds: Vec<ActivityKind> = trail.entries().iter().map(|e| e.activity_kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActivityKind::CredentialAdded,
            ActivityKind::CredentialUpdated,
            ActivityKind::CredentialDeleted,
            ActivityKind::CredentialDeleted,
        ]
    );
    for entry in trail.entries() {
        let raw = entry.details.to_string();
        assert!(!raw.contains("hunter2"));
        assert!(!raw.contains("rotated"));
    }
}

#[tokio::test]
async fn connection_test_uses_stored_or_supplied_password() {
    let (app, _trail) = app();
    add_kafka(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/credentials/test",
        Some(json!({"serverId": 1, "serverKind": "Kafka"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (_, body) = send(
        &app,
        "POST",
        "/credentials/test",
        Some(json!({"serverId": 1, "serverKind": "Kafka", "password": "wrong"})),
    )
    .await;
    assert_eq!(body["success"], json!(false));
    assert!(!body.to_string().contains("wrong"));
}

#[tokio::test]
async fn connection_test_without_probe_or_server_fails_softly() {
    let (app, _trail) = app();

    let (status, body) = send(
        &app,
        "POST",
        "/credentials/test",
        Some(json!({"serverId": 2, "serverKind": "Redis"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));

    let (_, body) = send(
        &app,
        "POST",
        "/credentials/test",
        Some(json!({"serverId": 77, "serverKind": "Kafka"})),
    )
    .await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn healthz_is_ok() {
    let (app, _trail) = app();
    let (status, body) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}
