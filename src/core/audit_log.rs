//! Append-only audit trail for administrative mutations.
//!
//! Entries are write-once. The file-backed trail keeps a SHA-256 hash chain so
//! edits or deletions of past lines are detectable with [`FileAuditTrail::verify_chain`].

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::error::AuditError;
use crate::models::activity::ActivityKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub activity_kind: ActivityKind,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default = "unknown_actor")]
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u8>,
}

fn unknown_actor() -> String {
    "unknown".to_string()
}

fn detect_actor() -> String {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return format!("{}(sudo)", user);
        }
    }
    std::env::var("USER").unwrap_or_else(|_| unknown_actor())
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Durably record one entry and return its id.
    async fn append(
        &self,
        kind: ActivityKind,
        message: &str,
        details: serde_json::Value,
    ) -> Result<u64, AuditError>;
}

/// JSON-lines audit log under the vault root.
#[derive(Debug, Clone)]
pub struct FileAuditTrail {
    path: PathBuf,
    lock: PathBuf,
    actor: String,
}

impl FileAuditTrail {
    pub fn new(path: PathBuf, lock: PathBuf) -> Self {
        Self {
            path,
            lock,
            actor: detect_actor(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_blocking(
        &self,
        kind: ActivityKind,
        message: String,
        details: serde_json::Value,
    ) -> Result<u64, AuditError> {
        let _lock = FileLock::exclusive(&self.lock)?;
        let (last, torn_tail) = last_entry(&self.path)?;
        if torn_tail {
            warn!(path = %self.path.display(), "audit log ends mid-line, starting a fresh line");
        }
        let (id, prev_hash) = match last {
            Some(entry) => (entry.id + 1, entry.entry_hash),
            None => (1, None),
        };

        let mut entry = AuditEntry {
            id,
            timestamp: Utc::now(),
            activity_kind: kind,
            message,
            details,
            actor: self.actor.clone(),
            prev_hash,
            entry_hash: None,
            hash_version: Some(constants::AUDIT_HASH_VERSION),
        };
        entry.entry_hash = Some(compute_entry_hash(&entry)?);

        let line = serde_json::to_string(&entry)?;
        append_line(&self.path, &line, torn_tail)?;
        Ok(id)
    }

    /// Read entries from the log, keeping only the newest `limit` if given.
    pub fn read_log(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut malformed = 0usize;

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    malformed += 1;
                }
            }
        }

        if malformed > 0 {
            warn!(malformed, path = %self.path.display(), "malformed audit entries skipped");
        }

        if let Some(limit) = limit {
            if entries.len() > limit {
                entries = entries.split_off(entries.len() - limit);
            }
        }

        Ok(entries)
    }

    /// Verify the integrity of the audit chain. Returns (total, errors).
    pub fn verify_chain(&self) -> Result<(usize, Vec<String>), AuditError> {
        let entries = self.read_log(None)?;
        let mut errors = Vec::new();
        let mut prev_entry_hash: Option<String> = None;
        let mut prev_id: Option<u64> = None;

        for (i, entry) in entries.iter().enumerate() {
            if i > 0 && entry.prev_hash != prev_entry_hash {
                errors.push(format!(
                    "entry {}: prev_hash mismatch (expected {:?}, got {:?})",
                    entry.id, prev_entry_hash, entry.prev_hash
                ));
            }

            if let Some(prev) = prev_id {
                if entry.id <= prev {
                    errors.push(format!(
                        "entry {}: id not increasing (previous {})",
                        entry.id, prev
                    ));
                }
            }

            match &entry.entry_hash {
                Some(stored) => match compute_entry_hash(entry) {
                    Ok(computed) if &computed == stored => {}
                    Ok(_) => errors.push(format!(
                        "entry {}: entry_hash mismatch (tampered?)",
                        entry.id
                    )),
                    Err(e) => {
                        errors.push(format!("entry {}: cannot compute hash: {}", entry.id, e))
                    }
                },
                None => errors.push(format!("entry {}: missing entry_hash", entry.id)),
            }

            prev_entry_hash = entry.entry_hash.clone();
            prev_id = Some(entry.id);
        }

        Ok((entries.len(), errors))
    }
}

#[async_trait]
impl AuditTrail for FileAuditTrail {
    async fn append(
        &self,
        kind: ActivityKind,
        message: &str,
        details: serde_json::Value,
    ) -> Result<u64, AuditError> {
        let trail = self.clone();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || trail.append_blocking(kind, message, details)).await?
    }
}

/// Process-local trail, useful for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditTrail {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn append(
        &self,
        kind: ActivityKind,
        message: &str,
        details: serde_json::Value,
    ) -> Result<u64, AuditError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuditError::Rejected("audit buffer lock poisoned".into()))?;
        let id = entries.last().map(|e| e.id + 1).unwrap_or(1);
        entries.push(AuditEntry {
            id,
            timestamp: Utc::now(),
            activity_kind: kind,
            message: message.to_string(),
            details,
            actor: unknown_actor(),
            prev_hash: None,
            entry_hash: None,
            hash_version: None,
        });
        Ok(id)
    }
}

/// Compute canonical hash for an entry (excludes entry_hash field).
fn compute_entry_hash(entry: &AuditEntry) -> Result<String, AuditError> {
    let mut value = serde_json::to_value(entry)?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entryHash");
    }
    let canonical = canonicalize_value(&value);
    let canonical_str = serde_json::to_string(&canonical)?;
    let hash = Sha256::digest(canonical_str.as_bytes());
    Ok(format!("{:064x}", hash))
}

/// Canonicalize JSON by recursively sorting object keys.
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize_value(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

fn append_line(audit_path: &Path, line: &str, fresh_line: bool) -> Result<(), AuditError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)?;
    if fresh_line {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{}", line)?;
    file.sync_data()?;

    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(constants::AUDIT_LOG_MODE);
        fs::set_permissions(audit_path, perm)?;
    }

    Ok(())
}

/// Newest entry that still parses, and whether the file ends without a newline.
///
/// Lines that do not parse (a write torn by a crash) are skipped so the chain
/// continues from the last intact entry.
fn last_entry(path: &Path) -> Result<(Option<AuditEntry>, bool), AuditError> {
    if !path.exists() {
        return Ok((None, false));
    }

    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok((None, false));
    }

    let mut last_byte = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last_byte)?;
    let torn_tail = last_byte[0] != b'\n';

    const CHUNK: u64 = 8192;
    let mut offset = len;
    let mut carry: Vec<u8> = Vec::new();
    let mut skipped = 0usize;

    while offset > 0 {
        let read_size = std::cmp::min(CHUNK, offset);
        offset -= read_size;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; read_size as usize];
        file.read_exact(&mut buf)?;
        buf.extend_from_slice(&carry);

        let mut lines: Vec<&[u8]> = buf.split(|b| *b == b'\n').collect();
        // The first segment may continue in the previous chunk.
        let head = if offset > 0 { Some(lines.remove(0)) } else { None };

        for line in lines.iter().rev() {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            match serde_json::from_slice::<AuditEntry>(line) {
                Ok(entry) => {
                    if skipped > 0 {
                        warn!(
                            skipped,
                            path = %path.display(),
                            "unparseable audit lines at end of log, chaining from last intact entry"
                        );
                    }
                    return Ok((Some(entry), torn_tail));
                }
                Err(_) => skipped += 1,
            }
        }

        carry = head.map(<[u8]>::to_vec).unwrap_or_default();
    }

    if skipped > 0 {
        warn!(skipped, path = %path.display(), "audit log has no intact entry");
    }
    Ok((None, torn_tail))
}
