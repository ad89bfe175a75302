//! Vault path resolution and directory structure.

use crate::constants;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub root: PathBuf,
    pub config_toml: PathBuf,
    pub config_lock: PathBuf,
    pub secrets_json: PathBuf,
    pub secrets_lock: PathBuf,
    pub audit_log: PathBuf,
    pub audit_lock: PathBuf,
}

impl VaultPaths {
    /// Resolve vault paths from CLI arg, env var, or the default root.
    pub fn resolve(root_arg: Option<PathBuf>) -> Self {
        if let Some(root) = root_arg {
            return Self::from_root(root);
        }
        match env::var(constants::ROOT_ENV) {
            Ok(root) if !root.trim().is_empty() => Self::from_root(PathBuf::from(root)),
            _ => Self::from_root(PathBuf::from(constants::DEFAULT_VAULT_ROOT)),
        }
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            config_toml: root.join("credvault.toml"),
            config_lock: root.join("credvault.lock"),
            secrets_json: root.join("secrets.json"),
            secrets_lock: root.join("secrets.lock"),
            audit_log: root.join("audit.log"),
            audit_lock: root.join("audit.lock"),
            root,
        }
    }
}

impl std::fmt::Display for VaultPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "credvault@{}", self.root.display())
    }
}
