//! Typed errors for the vault core. None of these ever carry plaintext secrets.

use crate::models::backend::BackendKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("decryption failed: integrity check did not pass")]
    DecryptionFailed,
    #[error("key error: {0}")]
    Key(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a credential already exists for server {server_id} ({server_kind})")]
    Conflict {
        server_id: i64,
        server_kind: BackendKind,
    },
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("credential {0} not found")]
    NotFound(i64),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit task failed: {0}")]
    Task(String),
    #[error("audit write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("server registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no credential configured for {kind} server '{address}'")]
    Unauthorized { kind: BackendKind, address: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AuditError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuditError::Task(err.to_string())
    }
}
