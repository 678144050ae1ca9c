//! Persistence gateway: the opaque key/value store holding the record.
//!
//! The core stores exactly one value, under
//! [`WALLET_DATA_KEY`](crate::record::WALLET_DATA_KEY). Platform adapters
//! (secure storage, keychain) implement [`PersistenceGateway`]; this
//! module ships an in-memory store and a directory-backed file store.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bpesa_types::{BpesaError, Result};
use tokio::sync::RwLock;

/// Opaque byte store keyed by string.
///
/// Every failure maps to [`BpesaError::PersistenceUnavailable`].
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Reads the value under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removes every value held by this store.
    async fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

const FILE_EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "json.tmp";

/// One file per key inside a directory.
///
/// Writes go to `<key>.json.tmp` and are renamed over `<key>.json`, so a
/// crash mid-write never leaves a truncated record behind.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created lazily
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the store's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str, extension: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(BpesaError::PersistenceUnavailable {
                reason: format!("invalid storage key {key:?}"),
            });
        }
        Ok(self.dir.join(format!("{key}.{extension}")))
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> BpesaError {
    BpesaError::PersistenceUnavailable {
        reason: format!("failed to {action} {}: {e}", path.display()),
    }
}

#[async_trait]
impl PersistenceGateway for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key, FILE_EXTENSION)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key, FILE_EXTENSION)?;
        let tmp_path = self.path_for(key, TMP_EXTENSION)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create", &self.dir, e))?;

        tokio::fs::write(&tmp_path, value)
            .await
            .map_err(|e| io_error("write", &tmp_path, e))?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_error("rename", &tmp_path, e));
        }

        tracing::debug!(path = %path.display(), "stored value written");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("list", &self.dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("list", &self.dir, e))?
        {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let owned = name.ends_with(&format!(".{FILE_EXTENSION}"))
                || name.ends_with(&format!(".{TMP_EXTENSION}"));
            if owned {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| io_error("remove", &path, e))?;
            }
        }

        tracing::debug!(dir = %self.dir.display(), "store cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
