//! CLI routing and command dispatch.

use crate::core::admin::CredentialAdmin;
use crate::core::audit_log::FileAuditTrail;
use crate::core::cipher::CredentialCipher;
use crate::core::config;
use crate::core::mutation::MutationAuditor;
use crate::core::paths::VaultPaths;
use crate::core::probe::ProbeSet;
use crate::core::registry::StaticServerRegistry;
use crate::core::resolver::CredentialResolver;
use crate::core::store::FileSecretStore;
use crate::core::vault::CredentialVault;
use crate::models::config::VaultFile;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod audit;
pub mod credential;
pub mod health;
pub mod init;
pub mod resolve;
pub mod serve;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: VaultPaths,
}

/// Everything a command needs once the vault is unlocked.
pub struct Services {
    pub config: VaultFile,
    pub vault: CredentialVault,
    pub admin: CredentialAdmin,
    pub resolver: CredentialResolver,
}

impl CliContext {
    pub fn load_config(&self) -> Result<VaultFile> {
        config::load(&self.paths.config_toml)
    }

    pub fn audit_trail(&self) -> FileAuditTrail {
        FileAuditTrail::new(self.paths.audit_log.clone(), self.paths.audit_lock.clone())
    }

    /// Load config and the master key, then wire the vault, trail, registry and probes.
    pub fn open(&self) -> Result<Services> {
        let config = self.load_config()?;
        let master = config::load_master_key(&config.vault, &self.paths.root)?;
        let cipher = CredentialCipher::new(&master).context("derive vault key")?;
        debug!(fingerprint = cipher.key_fingerprint(), "vault key ready");

        let store = FileSecretStore::new(
            self.paths.secrets_json.clone(),
            self.paths.secrets_lock.clone(),
        );
        let vault = CredentialVault::new(Arc::new(store), Arc::new(cipher));
        let registry = Arc::new(StaticServerRegistry::new(config.servers.clone()));
        let probes = ProbeSet::tcp(Duration::from_millis(config.probe.timeout_ms));

        let admin = CredentialAdmin::new(
            vault.clone(),
            MutationAuditor::new(Arc::new(self.audit_trail())),
            registry.clone(),
            probes,
        );
        let resolver = CredentialResolver::new(registry, vault.clone());

        Ok(Services {
            config,
            vault,
            admin,
            resolver,
        })
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "credvault",
    version,
    about = "Encrypted credential vault for broker and cloud backends"
)]
pub struct Cli {
    /// Vault root directory (default: $CREDVAULT_ROOT or /var/lib/credvault)
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "CREDVAULT_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        crate::telemetry::init(self.log_json)?;
        let ctx = CliContext {
            paths: VaultPaths::resolve(self.root),
        };
        debug!(vault = %ctx.paths, command = self.command.name(), "dispatch");

        match self.command {
            Commands::Init(args) => init::run(&ctx, args),
            Commands::Credential { command } => credential::run(&ctx, command).await,
            Commands::Resolve(args) => resolve::run(&ctx, args).await,
            Commands::Audit { command } => audit::run(&ctx, command),
            Commands::Health(args) => health::run(&ctx, args).await,
            Commands::Serve(args) => serve::run(&ctx, args).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the vault directory and configuration
    Init(init::InitArgs),
    /// Add, inspect, change, remove or test stored credentials
    Credential {
        #[command(subcommand)]
        command: credential::CredentialCommand,
    },
    /// Resolve the credential for a server address (metadata only)
    Resolve(resolve::ResolveArgs),
    /// View and verify the audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
    /// Run health checks on the vault
    Health(health::HealthArgs),
    /// Serve the JSON admin API
    Serve(serve::ServeArgs),
}

impl Commands {
    /// Command name for log fields and error messages.
    pub fn name(&self) -> &str {
        match self {
            Commands::Init(_) => "init",
            Commands::Credential { .. } => "credential",
            Commands::Resolve(_) => "resolve",
            Commands::Audit { .. } => "audit",
            Commands::Health(_) => "health",
            Commands::Serve(_) => "serve",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "credvault",
            "--root",
            "/tmp/v",
            "--log-json",
            "credential",
            "show",
            "--server-id",
            "3",
            "--kind",
            "redis",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/v")));
        assert!(cli.log_json);
        assert_eq!(cli.command.name(), "credential");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let parsed = Cli::try_parse_from([
            "credvault",
            "credential",
            "show",
            "--server-id",
            "3",
            "--kind",
            "mongo",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_open_requires_master_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = CliContext {
            paths: VaultPaths::from_root(dir.path().to_path_buf()),
        };
        std::fs::write(
            &ctx.paths.config_toml,
            "[vault]\nmaster_key_env = \"CREDVAULT_TEST_UNSET_KEY_7F3A\"\n",
        )
        .unwrap();
        let err = ctx.open().err().unwrap();
        assert!(err.to_string().contains("CREDVAULT_TEST_UNSET_KEY_7F3A"));
    }
}
