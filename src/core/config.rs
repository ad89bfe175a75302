//! Loading and saving `credvault.toml`, and locating the master secret.

use crate::constants;
use crate::models::config::{VaultFile, VaultSection};
use crate::util::fs::set_file_mode;
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::fs;
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

pub fn load(path: &Path) -> Result<VaultFile> {
    if !path.exists() {
        return Ok(VaultFile::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("read vault config {}", path.display()))?;
    let mut vault: VaultFile = toml::from_str(&content)
        .with_context(|| format!("parse vault config {}", path.display()))?;
    if vault.vault.version == 0 {
        vault.vault.version = 1;
    }
    validate(&vault)?;
    Ok(vault)
}

pub fn save(path: &Path, vault: &VaultFile) -> Result<()> {
    validate(vault)?;
    let content = toml::to_string_pretty(vault).context("serialize vault config")?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).context("create temp vault config")?;
    tmp.write_all(content.as_bytes())
        .context("write vault config")?;
    tmp.as_file().sync_all().context("sync vault config")?;
    set_file_mode(tmp.as_file(), constants::CONFIG_FILE_MODE)
        .context("set permissions on temp vault config")?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("persist vault config: {}", err))?;
    Ok(())
}

/// Server rows must be unique per `(id, kind)`.
fn validate(vault: &VaultFile) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for server in &vault.servers {
        if !seen.insert((server.id, server.kind)) {
            bail!(
                "duplicate server entry: {} server {} is listed twice",
                server.kind,
                server.id
            );
        }
    }
    Ok(())
}

/// Read the master secret named by the `[vault]` section.
pub fn load_master_key(section: &VaultSection, root: &Path) -> Result<SecretString> {
    master_key_from(section, root, |name| std::env::var(name).ok())
}

fn master_key_from(
    section: &VaultSection,
    root: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SecretString> {
    if let Some(file) = &section.master_key_file {
        let path = root.join(file);
        let raw = Zeroizing::new(
            fs::read_to_string(&path)
                .with_context(|| format!("read master key file {}", path.display()))?,
        );
        let key = raw.trim_end_matches(['\r', '\n']);
        if key.is_empty() {
            bail!("master key file {} is empty", path.display());
        }
        return Ok(SecretString::from(key.to_string()));
    }

    match lookup(&section.master_key_env) {
        Some(value) if !value.is_empty() => Ok(SecretString::from(value)),
        _ => bail!(
            "master key not configured: set {} or [vault].master_key_file",
            section.master_key_env
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::BackendKind;
    use crate::models::server::ServerConfig;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let file = load(&dir.path().join("credvault.toml")).unwrap();
        assert!(file.servers.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credvault.toml");
        let mut file = VaultFile::default();
        file.servers
            .push(ServerConfig::new(3, BackendKind::Redis, "cache:6379"));
        save(&path, &file).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.servers.len(), 1);
        assert_eq!(loaded.servers[0].address, "cache:6379");
        #[cfg(unix)]
        assert_eq!(
            crate::util::fs::mode_of(&path),
            Some(constants::CONFIG_FILE_MODE)
        );
    }

    #[test]
    fn test_duplicate_servers_rejected() {
        let mut file = VaultFile::default();
        file.servers
            .push(ServerConfig::new(1, BackendKind::Kafka, "a:9092"));
        file.servers
            .push(ServerConfig::new(1, BackendKind::Kafka, "b:9092"));
        assert!(validate(&file).is_err());

        file.servers[1].kind = BackendKind::Redis;
        assert!(validate(&file).is_ok());
    }

    #[test]
    fn test_master_key_from_env() {
        let section = VaultSection::default();
        let key = master_key_from(&section, Path::new("/"), |name| {
            (name == "CREDVAULT_MASTER_KEY").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(key.expose_secret(), "from-env");

        let err = master_key_from(&section, Path::new("/"), |_| None).unwrap_err();
        assert!(err.to_string().contains("CREDVAULT_MASTER_KEY"));
    }

    #[test]
    fn test_master_key_file_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("master.key"), "from-file\n").unwrap();
        let section = VaultSection {
            master_key_file: Some("master.key".into()),
            ..VaultSection::default()
        };
        let key = master_key_from(&section, dir.path(), |_| Some("from-env".into())).unwrap();
        assert_eq!(key.expose_secret(), "from-file");
    }

    #[test]
    fn test_empty_master_key_file_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("master.key"), "\n").unwrap();
        let section = VaultSection {
            master_key_file: Some("master.key".into()),
            ..VaultSection::default()
        };
        assert!(master_key_from(&section, dir.path(), |_| None).is_err());
    }
}
