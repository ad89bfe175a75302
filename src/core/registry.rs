//! Lookup of backend server configuration rows by kind, id, or address.

use crate::error::RegistryError;
use crate::models::backend::BackendKind;
use crate::models::server::ServerConfig;
use async_trait::async_trait;
use std::collections::HashMap;

/// Source of server configuration rows for every backend kind.
///
/// Implementors only have to list rows per kind; the lookups scan that list in
/// order. Stores with an index on `(id, kind)` or on the address should override them.
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    async fn servers(&self, kind: BackendKind) -> Result<Vec<ServerConfig>, RegistryError>;

    async fn find(
        &self,
        kind: BackendKind,
        id: i64,
    ) -> Result<Option<ServerConfig>, RegistryError> {
        Ok(self.servers(kind).await?.into_iter().find(|s| s.id == id))
    }

    /// First row, in registry order, whose address matches exactly.
    async fn find_by_address(
        &self,
        kind: BackendKind,
        address: &str,
    ) -> Result<Option<ServerConfig>, RegistryError> {
        Ok(self
            .servers(kind)
            .await?
            .into_iter()
            .find(|s| s.matches_address(address)))
    }
}

/// Registry backed by the `[[servers]]` entries of `credvault.toml`.
#[derive(Debug, Clone, Default)]
pub struct StaticServerRegistry {
    by_kind: HashMap<BackendKind, Vec<ServerConfig>>,
}

impl StaticServerRegistry {
    pub fn new(servers: impl IntoIterator<Item = ServerConfig>) -> Self {
        let mut by_kind: HashMap<BackendKind, Vec<ServerConfig>> = HashMap::new();
        for server in servers {
            by_kind.entry(server.kind).or_default().push(server);
        }
        Self { by_kind }
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ServerRegistry for StaticServerRegistry {
    async fn servers(&self, kind: BackendKind) -> Result<Vec<ServerConfig>, RegistryError> {
        Ok(self.by_kind.get(&kind).cloned().unwrap_or_default())
    }

    async fn find(
        &self,
        kind: BackendKind,
        id: i64,
    ) -> Result<Option<ServerConfig>, RegistryError> {
        Ok(self
            .by_kind
            .get(&kind)
            .and_then(|rows| rows.iter().find(|s| s.id == id))
            .cloned())
    }
}
