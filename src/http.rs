//! JSON admin API over the credential vault.
//!
//! Responses carry ids, kinds, timestamps and probe results only. Request bodies
//! may contain secrets; their `Debug` output is redacted.

use crate::core::admin::{AdminError, ConnectionTest, CredentialAdmin};
use crate::core::probe::ProbeOutcome;
use crate::error::{CipherError, StoreError, VaultError};
use crate::models::backend::BackendKind;
use crate::models::secret::{CredentialMetadata, CredentialUpdate, NewCredential};
use anyhow::Context;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub admin: CredentialAdmin,
}

impl AppState {
    pub fn new(admin: CredentialAdmin) -> Self {
        Self { admin }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/credentials", post(add_credential))
        .route("/credentials/test", post(test_credential))
        .route(
            "/credentials/{id}",
            put(update_credential).delete(delete_credential),
        )
        .route("/credentials/{server_id}/{server_kind}", get(get_metadata))
        .with_state(state)
}

/// Bind and serve until ctrl-c or SIGTERM.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind http listener on {}", addr))?;
    info!(%addr, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCredentialRequest {
    pub server_id: i64,
    pub server_kind: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub extra_config: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub extra_config: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCredentialRequest {
    pub server_id: i64,
    pub server_kind: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn redacted(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl fmt::Debug for AddCredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddCredentialRequest")
            .field("server_id", &self.server_id)
            .field("server_kind", &self.server_kind)
            .field("username", &redacted(&self.username))
            .field("password", &redacted(&self.password))
            .field("extra_config", &redacted(&self.extra_config))
            .finish()
    }
}

impl fmt::Debug for UpdateCredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCredentialRequest")
            .field("username", &redacted(&self.username))
            .field("password", &redacted(&self.password))
            .field("extra_config", &redacted(&self.extra_config))
            .finish()
    }
}

impl fmt::Debug for TestCredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCredentialRequest")
            .field("server_id", &self.server_id)
            .field("server_kind", &self.server_kind)
            .field("username", &redacted(&self.username))
            .field("password", &redacted(&self.password))
            .finish()
    }
}

/// JSON body extractor whose rejections use the API error shape.
///
/// Messages stay generic: serde errors can quote the offending input, which
/// may be a secret.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "request body rejected");
                Err(AppError::BadRequest(body_rejection_message(&rejection).to_string()))
            }
        }
    }
}

fn body_rejection_message(rejection: &JsonRejection) -> &'static str {
    match rejection {
        JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
        JsonRejection::JsonDataError(_) => "request body does not match the expected fields",
        JsonRejection::MissingJsonContentType(_) => "expected Content-Type: application/json",
        _ => "request body could not be read",
    }
}

/// Path extractor whose rejections use the API error shape.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| Self(value))
            .map_err(|rejection: PathRejection| AppError::BadRequest(rejection.body_text()))
    }
}

fn parse_kind(raw: &str) -> Result<BackendKind, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn add_credential(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AddCredentialRequest>,
) -> Result<Json<i64>, AppError> {
    let kind = parse_kind(&request.server_kind)?;
    let credential = NewCredential {
        server_id: request.server_id,
        server_kind: kind,
        username: request.username.map(SecretString::from),
        password: request.password.map(SecretString::from),
        extra_config: request.extra_config.map(SecretString::from),
    };
    let id = state.admin.add(credential).await?;
    debug!(id, server_id = request.server_id, server_kind = %kind, "credential added");
    Ok(Json(id))
}

async fn get_metadata(
    State(state): State<AppState>,
    ApiPath((server_id, server_kind)): ApiPath<(i64, String)>,
) -> Result<Json<CredentialMetadata>, AppError> {
    let kind = parse_kind(&server_kind)?;
    state
        .admin
        .metadata(server_id, kind)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

async fn update_credential(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateCredentialRequest>,
) -> Result<Json<bool>, AppError> {
    let update = CredentialUpdate {
        username: request.username.map(SecretString::from),
        password: request.password.map(SecretString::from),
        extra_config: request.extra_config.map(SecretString::from),
    };
    Ok(Json(state.admin.update(id, update).await?))
}

async fn delete_credential(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<bool>, AppError> {
    Ok(Json(state.admin.delete(id).await?))
}

async fn test_credential(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TestCredentialRequest>,
) -> Result<Json<ProbeOutcome>, AppError> {
    let test = ConnectionTest {
        server_id: request.server_id,
        server_kind: parse_kind(&request.server_kind)?,
        username: request.username.map(SecretString::from),
        password: request.password.map(SecretString::from),
    };
    Ok(Json(state.admin.test_connection(test).await?))
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("internal error")]
    Internal,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unavailable(_) => "unavailable",
            AppError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Vault(VaultError::Store(StoreError::Conflict { .. })) => {
                AppError::Conflict(err.to_string())
            }
            AdminError::Vault(VaultError::Cipher(CipherError::InvalidArgument(reason))) => {
                AppError::BadRequest(reason.to_string())
            }
            AdminError::Vault(VaultError::NotFound(_)) => AppError::NotFound,
            AdminError::Audit(audit) => {
                error!(error = %audit, "credential request refused, audit trail unavailable");
                AppError::Unavailable(audit.to_string())
            }
            AdminError::Registry(registry) => AppError::Unavailable(registry.to_string()),
            other => {
                error!(error = %other, "credential request failed");
                AppError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;

    #[test]
    fn test_request_debug_is_redacted() {
        let request = AddCredentialRequest {
            server_id: 1,
            server_kind: "Kafka".into(),
            username: Some("admin".into()),
            password: Some("hunter2".into()),
            extra_config: None,
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("admin"));
        assert!(debug.contains("[REDACTED]"));

        let update = UpdateCredentialRequest {
            password: Some("s3cret".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", update).contains("s3cret"));
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = AdminError::Vault(VaultError::Store(StoreError::Conflict {
            server_id: 1,
            server_kind: BackendKind::Kafka,
        }));
        assert_eq!(AppError::from(err).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_audit_failure_maps_to_503() {
        let err = AdminError::Audit(AuditError::Rejected("disk full".into()));
        let app = AppError::from(err);
        assert_eq!(app.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(app.code(), "unavailable");
    }

    #[test]
    fn test_unknown_kind_is_bad_request() {
        let err = parse_kind("Mongo").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
