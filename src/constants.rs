//! Centralized constants for permissions, paths, crypto parameters, and limits.

/// Default vault root directory.
pub const DEFAULT_VAULT_ROOT: &str = "/var/lib/credvault";

/// Environment variable overriding the vault root.
pub const ROOT_ENV: &str = "CREDVAULT_ROOT";

/// Default environment variable holding the master secret.
pub const DEFAULT_MASTER_KEY_ENV: &str = "CREDVAULT_MASTER_KEY";

/// Default HTTP bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default connectivity probe timeout.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;

/// Permission mode for the vault root directory.
pub const VAULT_DIR_MODE: u32 = 0o700;

/// Permission mode for the secret store document.
pub const SECRETS_FILE_MODE: u32 = 0o600;

/// Permission mode for credvault.toml.
pub const CONFIG_FILE_MODE: u32 = 0o640;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// Maximum secret size in bytes (1 MiB).
pub const MAX_SECRET_SIZE: usize = 1_048_576;

/// HKDF salt used when deriving the vault key from the master secret.
pub const KEY_DERIVATION_SALT: &[u8] = b"credvault/hkdf-salt/v1";

/// HKDF info string binding the derived key to its purpose.
pub const KEY_DERIVATION_CONTEXT: &[u8] = b"credvault/credential-encryption/v1";

/// Domain separation tag hashed in front of the key for its fingerprint.
pub const FINGERPRINT_DOMAIN: &[u8] = b"credvault/key-fingerprint/v1";

/// Number of hex characters kept from the fingerprint digest.
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// AES-256-GCM key length.
pub const KEY_LEN: usize = 32;

/// AES-256-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM tag length.
pub const TAG_LEN: usize = 16;

/// Hash chain format written by the audit log.
pub const AUDIT_HASH_VERSION: u8 = 2;
