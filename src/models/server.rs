//! Server configuration rows the resolver matches addresses against.

use crate::models::backend::BackendKind;
use serde::{Deserialize, Serialize};

/// One backend configuration row, addressed by `(id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: i64,
    pub kind: BackendKind,
    #[serde(default)]
    pub name: String,
    pub address: String,
}

impl ServerConfig {
    pub fn new(id: i64, kind: BackendKind, address: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: String::new(),
            address: address.into(),
        }
    }

    /// Exact match against a human-entered address, ignoring surrounding whitespace.
    pub fn matches_address(&self, address: &str) -> bool {
        let wanted = address.trim();
        !wanted.is_empty() && self.address.trim() == wanted
    }
}
