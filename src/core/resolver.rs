//! Turns a human-entered server address into a usable, possibly absent, credential.
//!
//! Every backend adapter obtains secrets through [`CredentialResolver::resolve`].
//! No matching server row and no stored secret are both ordinary outcomes: the
//! adapter then connects with the backend's default or anonymous authentication.

use crate::core::registry::ServerRegistry;
use crate::core::vault::CredentialVault;
use crate::error::ResolveError;
use crate::models::backend::BackendKind;
use crate::models::secret::SecretRecord;
use crate::models::server::ServerConfig;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// A decrypted credential together with the server row it belongs to.
#[derive(Debug)]
pub struct ResolvedCredential {
    pub server: ServerConfig,
    pub secret: SecretRecord,
}

#[derive(Clone)]
pub struct CredentialResolver {
    registry: Arc<dyn ServerRegistry>,
    vault: CredentialVault,
}

impl CredentialResolver {
    pub fn new(registry: Arc<dyn ServerRegistry>, vault: CredentialVault) -> Self {
        Self { registry, vault }
    }

    pub fn registry(&self) -> &Arc<dyn ServerRegistry> {
        &self.registry
    }

    pub async fn resolve(
        &self,
        kind: BackendKind,
        address: &str,
    ) -> Result<Option<ResolvedCredential>, ResolveError> {
        let span = info_span!("credential.resolve", server_kind = %kind);
        async move {
            let Some(server) = self.registry.find_by_address(kind, address).await? else {
                debug!("no server configuration matches address");
                return Ok(None);
            };

            let Some(secret) = self.vault.get_by_server(server.id, kind).await? else {
                debug!(server_id = server.id, "server has no usable credential");
                return Ok(None);
            };

            self.vault.touch_last_used(secret.id).await;
            debug!(server_id = server.id, secret_id = secret.id, "credential resolved");
            Ok(Some(ResolvedCredential { server, secret }))
        }
        .instrument(span)
        .await
    }

    /// Like [`resolve`](Self::resolve) for operations that cannot run anonymously.
    pub async fn require(
        &self,
        kind: BackendKind,
        address: &str,
    ) -> Result<ResolvedCredential, ResolveError> {
        self.resolve(kind, address)
            .await?
            .ok_or_else(|| ResolveError::Unauthorized {
                kind,
                address: address.trim().to_string(),
            })
    }
}
