use crate::cli::CliContext;
use crate::constants;
use crate::core::config;
use crate::core::file_lock::FileLock;
use crate::util::fs as vault_fs;
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Read the master key from this file (relative to the vault root) instead of the env var
    #[arg(long, value_name = "PATH")]
    pub master_key_file: Option<String>,

    /// Default listen address for `serve`
    #[arg(long)]
    pub bind: Option<String>,
}

pub fn run(ctx: &CliContext, args: InitArgs) -> Result<()> {
    let paths = &ctx.paths;
    vault_fs::ensure_dir(&paths.root, constants::VAULT_DIR_MODE)?;

    let lock = FileLock::exclusive(&paths.config_lock)
        .with_context(|| format!("lock {}", paths.config_lock.display()))?;
    let mut vault = config::load(&paths.config_toml)?;
    if let Some(file) = args.master_key_file {
        vault.vault.master_key_file = Some(file);
    }
    if let Some(bind) = args.bind {
        vault.http.bind = bind;
    }
    config::save(&paths.config_toml, &vault)?;
    drop(lock);

    println!("vault initialized at {}", paths.root.display());
    match &vault.vault.master_key_file {
        Some(file) => println!("master key: file {}", paths.root.join(file).display()),
        None => println!("master key: ${}", vault.vault.master_key_env),
    }
    if vault.servers.is_empty() {
        println!(
            "no servers configured yet: add [[servers]] entries to {}",
            paths.config_toml.display()
        );
    }
    Ok(())
}
