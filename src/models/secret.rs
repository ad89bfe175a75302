//! Secret records as persisted (ciphertext) and as handed to callers (plaintext).

use crate::models::backend::BackendKind;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A vault row exactly as stored. Secret fields hold cipher blobs, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSecret {
    pub id: i64,
    pub server_id: i64,
    pub server_kind: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<String>,
    pub key_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Row to insert; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewStoredSecret {
    pub server_id: i64,
    pub server_kind: BackendKind,
    pub username: Option<String>,
    pub password: Option<String>,
    pub extra_config: Option<String>,
    pub key_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Replacement ciphertexts for an existing row. `None` leaves the stored value untouched.
#[derive(Debug, Clone)]
pub struct SecretPatch {
    pub username: Option<String>,
    pub password: Option<String>,
    pub extra_config: Option<String>,
    pub key_fingerprint: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SecretPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.extra_config.is_none()
    }

    pub fn apply(self, row: &mut StoredSecret) {
        if let Some(username) = self.username {
            row.username = Some(username);
        }
        if let Some(password) = self.password {
            row.password = Some(password);
        }
        if let Some(extra) = self.extra_config {
            row.extra_config = Some(extra);
        }
        if let Some(fingerprint) = self.key_fingerprint {
            row.key_fingerprint = fingerprint;
        }
        row.updated_at = self.updated_at;
    }
}

/// A decrypted vault entry. Debug output redacts every secret field.
#[derive(Debug)]
pub struct SecretRecord {
    pub id: i64,
    pub server_id: i64,
    pub server_kind: BackendKind,
    pub username: Option<SecretString>,
    pub password: Option<SecretString>,
    pub extra_config: Option<SecretString>,
    pub key_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(|s| s.expose_secret())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|s| s.expose_secret())
    }

    pub fn extra_config(&self) -> Option<&str> {
        self.extra_config.as_ref().map(|s| s.expose_secret())
    }

    pub fn metadata(&self) -> CredentialMetadata {
        CredentialMetadata {
            id: self.id,
            server_id: self.server_id,
            server_kind: self.server_kind,
            has_credentials: true,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

/// Plaintext input for a new credential.
#[derive(Debug)]
pub struct NewCredential {
    pub server_id: i64,
    pub server_kind: BackendKind,
    pub username: Option<SecretString>,
    pub password: Option<SecretString>,
    pub extra_config: Option<SecretString>,
}

impl NewCredential {
    pub fn new(server_id: i64, server_kind: BackendKind) -> Self {
        Self {
            server_id,
            server_kind,
            username: None,
            password: None,
            extra_config: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(SecretString::from(username.into()));
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_extra_config(mut self, extra: impl Into<String>) -> Self {
        self.extra_config = Some(SecretString::from(extra.into()));
        self
    }

    pub fn supplied_fields(&self) -> Vec<&'static str> {
        field_names(&self.username, &self.password, &self.extra_config)
    }
}

/// Plaintext partial update. Absent or empty fields keep their stored ciphertext.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    pub username: Option<SecretString>,
    pub password: Option<SecretString>,
    pub extra_config: Option<SecretString>,
}

impl CredentialUpdate {
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(SecretString::from(username.into()));
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_extra_config(mut self, extra: impl Into<String>) -> Self {
        self.extra_config = Some(SecretString::from(extra.into()));
        self
    }

    /// Names of the fields this update will actually replace.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        field_names(&self.username, &self.password, &self.extra_config)
    }
}

fn field_names(
    username: &Option<SecretString>,
    password: &Option<SecretString>,
    extra_config: &Option<SecretString>,
) -> Vec<&'static str> {
    [
        ("username", username),
        ("password", password),
        ("extraConfig", extra_config),
    ]
    .into_iter()
    .filter(|(_, value)| supplied(value))
    .map(|(name, _)| name)
    .collect()
}

/// True when the field is present and non-empty.
pub(crate) fn supplied(value: &Option<SecretString>) -> bool {
    value
        .as_ref()
        .map(|s| !s.expose_secret().is_empty())
        .unwrap_or(false)
}

/// Metadata-only view served to callers; never carries secret values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    pub id: i64,
    pub server_id: i64,
    pub server_kind: BackendKind,
    pub has_credentials: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}
