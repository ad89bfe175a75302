//! Encrypted credential vault: one secret record per `(server_id, server_kind)`.
//!
//! Reads fail closed: a row with any field that cannot be decrypted is reported as
//! absent, the same as a server that never had a credential configured.

use crate::core::cipher::CredentialCipher;
use crate::core::store::SecretStore;
use crate::error::{CipherError, VaultError};
use crate::models::backend::BackendKind;
use crate::models::secret::{
    CredentialMetadata, CredentialUpdate, NewCredential, NewStoredSecret, SecretPatch,
    SecretRecord, StoredSecret,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn SecretStore>,
    cipher: Arc<CredentialCipher>,
}

/// Key bookkeeping for one stored row, without any secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    pub id: i64,
    pub server_id: i64,
    pub server_kind: BackendKind,
    pub key_fingerprint: String,
    pub current_key: bool,
    pub readable: bool,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn SecretStore>, cipher: Arc<CredentialCipher>) -> Self {
        Self { store, cipher }
    }

    pub fn key_fingerprint(&self) -> &str {
        self.cipher.key_fingerprint()
    }

    pub async fn add(&self, credential: NewCredential) -> Result<i64, VaultError> {
        let row = NewStoredSecret {
            server_id: credential.server_id,
            server_kind: credential.server_kind,
            username: self.seal(credential.username.as_ref())?,
            password: self.seal(credential.password.as_ref())?,
            extra_config: self.seal(credential.extra_config.as_ref())?,
            key_fingerprint: self.cipher.key_fingerprint().to_string(),
            created_at: Utc::now(),
        };
        let id = self.store.insert(row).await?;
        info!(
            id,
            server_id = credential.server_id,
            server_kind = %credential.server_kind,
            "credential stored"
        );
        Ok(id)
    }

    pub async fn get_by_server(
        &self,
        server_id: i64,
        server_kind: BackendKind,
    ) -> Result<Option<SecretRecord>, VaultError> {
        let row = self.store.find_by_server(server_id, server_kind).await?;
        Ok(row.and_then(|row| self.open(row)))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SecretRecord>, VaultError> {
        let row = self.store.find(id).await?;
        Ok(row.and_then(|row| self.open(row)))
    }

    /// Metadata for a server's credential. Undecryptable rows are absent here too.
    pub async fn metadata(
        &self,
        server_id: i64,
        server_kind: BackendKind,
    ) -> Result<Option<CredentialMetadata>, VaultError> {
        Ok(self
            .get_by_server(server_id, server_kind)
            .await?
            .map(|record| record.metadata()))
    }

    /// Re-encrypt the supplied fields; everything else keeps its stored ciphertext.
    pub async fn update(&self, id: i64, update: CredentialUpdate) -> Result<bool, VaultError> {
        let mut patch = SecretPatch {
            username: self.seal(update.username.as_ref())?,
            password: self.seal(update.password.as_ref())?,
            extra_config: self.seal(update.extra_config.as_ref())?,
            key_fingerprint: None,
            updated_at: Utc::now(),
        };
        if !patch.is_empty() {
            patch.key_fingerprint = Some(self.cipher.key_fingerprint().to_string());
        }
        let found = self.store.update(id, patch).await?;
        if found {
            info!(id, fields = ?update.changed_fields(), "credential updated");
        }
        Ok(found)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, VaultError> {
        let found = self.store.delete(id).await?;
        if found {
            info!(id, "credential deleted");
        }
        Ok(found)
    }

    /// Best-effort last-used stamp. Never fails the caller.
    pub async fn touch_last_used(&self, id: i64) -> bool {
        match self.store.touch(id, Utc::now()).await {
            Ok(found) => found,
            Err(err) => {
                warn!(id, error = %err, "failed to record credential last use");
                false
            }
        }
    }

    /// Fingerprint and readability of every stored row, for rotation bookkeeping.
    pub async fn key_report(&self) -> Result<Vec<KeyStatus>, VaultError> {
        let rows = self.store.list().await?;
        Ok(rows
            .iter()
            .map(|row| KeyStatus {
                id: row.id,
                server_id: row.server_id,
                server_kind: row.server_kind,
                key_fingerprint: row.key_fingerprint.clone(),
                current_key: row.key_fingerprint == self.cipher.key_fingerprint(),
                readable: self.open_fields(row).is_ok(),
            })
            .collect())
    }

    fn seal(&self, value: Option<&SecretString>) -> Result<Option<String>, CipherError> {
        match value.map(|v| v.expose_secret()) {
            Some(plain) if !plain.is_empty() => self.cipher.encrypt(plain).map(Some),
            _ => Ok(None),
        }
    }

    fn unseal(&self, blob: Option<&str>) -> Result<Option<SecretString>, CipherError> {
        blob.map(|b| self.cipher.decrypt(b).map(SecretString::from))
            .transpose()
    }

    #[allow(clippy::type_complexity)]
    fn open_fields(
        &self,
        row: &StoredSecret,
    ) -> Result<
        (
            Option<SecretString>,
            Option<SecretString>,
            Option<SecretString>,
        ),
        CipherError,
    > {
        Ok((
            self.unseal(row.username.as_deref())?,
            self.unseal(row.password.as_deref())?,
            self.unseal(row.extra_config.as_deref())?,
        ))
    }

    fn open(&self, row: StoredSecret) -> Option<SecretRecord> {
        match self.open_fields(&row) {
            Ok((username, password, extra_config)) => {
                debug!(id = row.id, "credential decrypted");
                Some(SecretRecord {
                    id: row.id,
                    server_id: row.server_id,
                    server_kind: row.server_kind,
                    username,
                    password,
                    extra_config,
                    key_fingerprint: row.key_fingerprint,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                    last_used_at: row.last_used_at,
                })
            }
            Err(err) => {
                warn!(
                    id = row.id,
                    server_id = row.server_id,
                    server_kind = %row.server_kind,
                    stored_key = %row.key_fingerprint,
                    active_key = %self.cipher.key_fingerprint(),
                    error = %err,
                    "credential unreadable, treating as absent"
                );
                None
            }
        }
    }
}
