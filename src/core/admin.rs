//! Credential administration: vault operations wrapped in the audit ordering policy.

use crate::core::mutation::{Mutation, MutationAuditor, MutationError};
use crate::core::probe::{ProbeOutcome, ProbeSet};
use crate::core::registry::ServerRegistry;
use crate::core::vault::CredentialVault;
use crate::error::{AuditError, RegistryError, VaultError};
use crate::models::activity::ActivityKind;
use crate::models::backend::BackendKind;
use crate::models::secret::{supplied, CredentialMetadata, CredentialUpdate, NewCredential};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<MutationError<VaultError>> for AdminError {
    fn from(err: MutationError<VaultError>) -> Self {
        match err {
            MutationError::Audit(e) => AdminError::Audit(e),
            MutationError::Remote(e) => AdminError::Vault(e),
        }
    }
}

/// Connectivity test input. Credentials are optional; the stored ones are used when absent.
#[derive(Debug)]
pub struct ConnectionTest {
    pub server_id: i64,
    pub server_kind: BackendKind,
    pub username: Option<SecretString>,
    pub password: Option<SecretString>,
}

#[derive(Clone)]
pub struct CredentialAdmin {
    vault: CredentialVault,
    auditor: MutationAuditor,
    registry: Arc<dyn ServerRegistry>,
    probes: ProbeSet,
}

impl CredentialAdmin {
    pub fn new(
        vault: CredentialVault,
        auditor: MutationAuditor,
        registry: Arc<dyn ServerRegistry>,
        probes: ProbeSet,
    ) -> Self {
        Self {
            vault,
            auditor,
            registry,
            probes,
        }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub async fn add(&self, credential: NewCredential) -> Result<i64, AdminError> {
        let fields = credential.supplied_fields();
        let mutation = Mutation::new(
            ActivityKind::CredentialAdded,
            format!(
                "Stored credential for {} server {}",
                credential.server_kind, credential.server_id
            ),
        )
        .with_details(json!({
            "serverId": credential.server_id,
            "serverKind": credential.server_kind,
            "fields": fields,
        }));

        Ok(self.auditor.run(mutation, self.vault.add(credential)).await?)
    }

    /// Returns false when no credential has this id; nothing is audited then.
    pub async fn update(&self, id: i64, update: CredentialUpdate) -> Result<bool, AdminError> {
        let mutation = Mutation::new(
            ActivityKind::CredentialUpdated,
            format!("Changed credential {}", id),
        )
        .with_details(json!({ "id": id, "fields": update.changed_fields() }));

        let vault = &self.vault;
        let result = self
            .auditor
            .run(mutation, async move {
                match vault.update(id, update).await? {
                    true => Ok(()),
                    false => Err(VaultError::NotFound(id)),
                }
            })
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(MutationError::Remote(VaultError::NotFound(_))) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// The intent is recorded before the row is removed, even if it turns out not to exist.
    pub async fn delete(&self, id: i64) -> Result<bool, AdminError> {
        let mutation = Mutation::new(
            ActivityKind::CredentialDeleted,
            format!("Removed credential {}", id),
        )
        .with_details(json!({ "id": id }));

        Ok(self.auditor.run(mutation, self.vault.delete(id)).await?)
    }

    pub async fn metadata(
        &self,
        server_id: i64,
        server_kind: BackendKind,
    ) -> Result<Option<CredentialMetadata>, AdminError> {
        Ok(self.vault.metadata(server_id, server_kind).await?)
    }

    pub async fn test_connection(&self, test: ConnectionTest) -> Result<ProbeOutcome, AdminError> {
        let Some(server) = self.registry.find(test.server_kind, test.server_id).await? else {
            return Ok(ProbeOutcome::failed(format!(
                "no {} server with id {}",
                test.server_kind, test.server_id
            )));
        };
        let Some(probe) = self.probes.get(test.server_kind) else {
            return Ok(ProbeOutcome::failed(format!(
                "no connectivity probe for {} servers",
                test.server_kind
            )));
        };

        if supplied(&test.username) || supplied(&test.password) {
            let username = test.username.as_ref().map(|s| s.expose_secret());
            let password = test.password.as_ref().map(|s| s.expose_secret());
            return Ok(probe.probe(&server, username, password).await);
        }

        let stored = self
            .vault
            .get_by_server(test.server_id, test.server_kind)
            .await?;
        Ok(match stored {
            Some(secret) => probe.probe(&server, secret.username(), secret.password()).await,
            None => probe.probe(&server, None, None).await,
        })
    }
}
