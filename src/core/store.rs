//! Persistence for encrypted vault rows.
//!
//! Every operation is a single atomic row operation. Uniqueness of
//! `(server_id, server_kind)` is enforced inside the same critical section as the
//! insert, so concurrent adds for one server cannot both succeed.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::error::StoreError;
use crate::models::backend::BackendKind;
use crate::models::secret::{NewStoredSecret, SecretPatch, StoredSecret};
use crate::util::fs as vault_fs;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert a row, failing with `Conflict` if the server already has one.
    async fn insert(&self, row: NewStoredSecret) -> Result<i64, StoreError>;

    async fn find(&self, id: i64) -> Result<Option<StoredSecret>, StoreError>;

    async fn find_by_server(
        &self,
        server_id: i64,
        server_kind: BackendKind,
    ) -> Result<Option<StoredSecret>, StoreError>;

    /// Apply a field patch. Returns false when the row does not exist.
    async fn update(&self, id: i64, patch: SecretPatch) -> Result<bool, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<StoredSecret>, StoreError>;
}

/// The whole table: rows keyed by id plus the id sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretTable {
    #[serde(default)]
    next_id: i64,
    #[serde(default)]
    secrets: BTreeMap<i64, StoredSecret>,
}

impl SecretTable {
    fn insert(&mut self, row: NewStoredSecret) -> Result<i64, StoreError> {
        if self.by_server(row.server_id, row.server_kind).is_some() {
            return Err(StoreError::Conflict {
                server_id: row.server_id,
                server_kind: row.server_kind,
            });
        }
        let last = self.secrets.keys().next_back().copied().unwrap_or(0);
        let id = self.next_id.max(last) + 1;
        self.next_id = id;
        self.secrets.insert(
            id,
            StoredSecret {
                id,
                server_id: row.server_id,
                server_kind: row.server_kind,
                username: row.username,
                password: row.password,
                extra_config: row.extra_config,
                key_fingerprint: row.key_fingerprint,
                created_at: row.created_at,
                updated_at: row.created_at,
                last_used_at: None,
            },
        );
        Ok(id)
    }

    fn by_server(&self, server_id: i64, server_kind: BackendKind) -> Option<&StoredSecret> {
        self.secrets
            .values()
            .find(|s| s.server_id == server_id && s.server_kind == server_kind)
    }

    fn update(&mut self, id: i64, patch: SecretPatch) -> bool {
        match self.secrets.get_mut(&id) {
            Some(row) => {
                patch.apply(row);
                true
            }
            None => false,
        }
    }

    fn touch(&mut self, id: i64, at: DateTime<Utc>) -> bool {
        match self.secrets.get_mut(&id) {
            Some(row) => {
                row.last_used_at = Some(at);
                true
            }
            None => false,
        }
    }
}

/// Process-local store. Used by tests and by embedders that bring their own durability.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    table: Arc<Mutex<SecretTable>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<R>(&self, f: impl FnOnce(&mut SecretTable) -> R) -> Result<R, StoreError> {
        let mut guard = self
            .table
            .lock()
            .map_err(|_| StoreError::Task("secret table lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn insert(&self, row: NewStoredSecret) -> Result<i64, StoreError> {
        self.with_table(|t| t.insert(row))?
    }

    async fn find(&self, id: i64) -> Result<Option<StoredSecret>, StoreError> {
        self.with_table(|t| t.secrets.get(&id).cloned())
    }

    async fn find_by_server(
        &self,
        server_id: i64,
        server_kind: BackendKind,
    ) -> Result<Option<StoredSecret>, StoreError> {
        self.with_table(|t| t.by_server(server_id, server_kind).cloned())
    }

    async fn update(&self, id: i64, patch: SecretPatch) -> Result<bool, StoreError> {
        self.with_table(|t| t.update(id, patch))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.with_table(|t| t.secrets.remove(&id).is_some())
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.with_table(|t| t.touch(id, at))
    }

    async fn list(&self) -> Result<Vec<StoredSecret>, StoreError> {
        self.with_table(|t| t.secrets.values().cloned().collect())
    }
}

/// JSON document store under the vault root, guarded by an exclusive file lock.
///
/// Writes go to a temp file in the same directory and are renamed into place, so a
/// reader never observes a half-written document.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
    lock: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: PathBuf, lock: PathBuf) -> Self {
        Self { path, lock }
    }

    async fn read<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&SecretTable) -> R + Send + 'static,
    {
        let path = self.path.clone();
        let lock = self.lock.clone();
        tokio::task::spawn_blocking(move || -> Result<R, StoreError> {
            let _lock = FileLock::exclusive(&lock)?;
            let table = load_table(&path)?;
            Ok(f(&table))
        })
        .await?
    }

    async fn write<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&mut SecretTable) -> Result<(R, bool), StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock = self.lock.clone();
        tokio::task::spawn_blocking(move || -> Result<R, StoreError> {
            let _lock = FileLock::exclusive(&lock)?;
            let mut table = load_table(&path)?;
            let (out, dirty) = f(&mut table)?;
            if dirty {
                save_table(&path, &table)?;
            }
            Ok(out)
        })
        .await?
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn insert(&self, row: NewStoredSecret) -> Result<i64, StoreError> {
        self.write(move |t| t.insert(row).map(|id| (id, true))).await
    }

    async fn find(&self, id: i64) -> Result<Option<StoredSecret>, StoreError> {
        self.read(move |t| t.secrets.get(&id).cloned()).await
    }

    async fn find_by_server(
        &self,
        server_id: i64,
        server_kind: BackendKind,
    ) -> Result<Option<StoredSecret>, StoreError> {
        self.read(move |t| t.by_server(server_id, server_kind).cloned())
            .await
    }

    async fn update(&self, id: i64, patch: SecretPatch) -> Result<bool, StoreError> {
        self.write(move |t| {
            let found = t.update(id, patch);
            Ok((found, found))
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.write(move |t| {
            let found = t.secrets.remove(&id).is_some();
            Ok((found, found))
        })
        .await
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.write(move |t| {
            let found = t.touch(id, at);
            Ok((found, found))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<StoredSecret>, StoreError> {
        self.read(|t| t.secrets.values().cloned().collect()).await
    }
}

fn load_table(path: &Path) -> Result<SecretTable, StoreError> {
    if !path.exists() {
        return Ok(SecretTable::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(SecretTable::default());
    }
    Ok(serde_json::from_str(&content)?)
}

fn save_table(path: &Path, table: &SecretTable) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(table)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(&content)?;
    tmp.as_file().sync_all()?;
    vault_fs::set_file_mode(tmp.as_file(), constants::SECRETS_FILE_MODE)?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
