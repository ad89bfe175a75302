//! Vault configuration file model (`credvault.toml`).

use crate::constants;
use crate::models::server::ServerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultFile {
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSection {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Environment variable holding the master secret.
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,
    /// File holding the master secret; takes precedence over the env var.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key_file: Option<String>,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            version: default_version(),
            master_key_env: default_master_key_env(),
            master_key_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSection {
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_master_key_env() -> String {
    constants::DEFAULT_MASTER_KEY_ENV.to_string()
}

fn default_bind() -> String {
    constants::DEFAULT_BIND.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    constants::DEFAULT_PROBE_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::BackendKind;

    #[test]
    fn test_defaults_from_empty_document() {
        let file: VaultFile = toml::from_str("").unwrap();
        assert_eq!(file.vault.version, 1);
        assert_eq!(file.vault.master_key_env, "CREDVAULT_MASTER_KEY");
        assert_eq!(file.http.bind, "127.0.0.1:8080");
        assert_eq!(file.probe.timeout_ms, 3000);
        assert!(file.servers.is_empty());
    }

    #[test]
    fn test_parse_servers() {
        let doc = r#"
[[servers]]
id = 1
kind = "Kafka"
name = "prod"
address = "kafka-1:9092"

[[servers]]
id = 4
kind = "RabbitMQ"
address = "amqp://mq:5672"
"#;
        let file: VaultFile = toml::from_str(doc).unwrap();
        assert_eq!(file.servers.len(), 2);
        assert_eq!(file.servers[0].kind, BackendKind::Kafka);
        assert_eq!(file.servers[0].name, "prod");
        assert_eq!(file.servers[1].kind, BackendKind::RabbitMq);
        assert!(file.servers[1].name.is_empty());
    }
}
