//! Local persistent storage backend
//!
//! Keeps one JSON document per context in a directory, so drafts survive
//! restarts on the same host. When the directory cannot be used the store
//! degrades instead of failing: loads return nothing and saves are
//! acknowledged without being written.

use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use wizard_core::storage::{check_revision, next_revision};
use wizard_core::{ContextKey, SaveReceipt, StorageAdapter, StorageError, StoredContext};

/// File-backed storage implementation
pub struct FileStorage {
    root: PathBuf,
    available: bool,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory
    pub async fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let available = match tokio::fs::create_dir_all(&root).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %root.display(),
                    error = %e,
                    "Storage directory unavailable, file storage disabled"
                );
                false
            }
        };

        Self {
            root,
            available,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether the directory could be opened
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ContextKey) -> PathBuf {
        let name = format!(
            "{}__{}__{}.json",
            encode_component(&key.workflow_id),
            encode_component(&key.tenant_id),
            encode_component(&key.user_id)
        );
        self.root.join(name)
    }

    async fn read(&self, path: &Path) -> Result<Option<StoredContext>, StorageError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Escape everything outside `[A-Za-z0-9.-]`; `_` is reserved for the field separator
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn save(&self, context: &StoredContext) -> Result<SaveReceipt, StorageError> {
        let saved_at = Utc::now();
        let key = context.key();

        if !self.available {
            debug!(key = %key, "File storage unavailable, save not persisted");
            return Ok(SaveReceipt {
                saved_at,
                context: next_revision(context, saved_at),
            });
        }

        let path = self.path_for(&key);
        let _guard = self.write_lock.lock().await;

        let stored = self.read(&path).await?;
        check_revision(&key, stored.as_ref(), context)?;

        let persisted = next_revision(context, saved_at);
        let bytes = serde_json::to_vec_pretty(&persisted)?;

        // Write-then-rename so readers never observe a partial document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(key = %key, path = %path.display(), revision = persisted.revision, "Saved context to file");
        Ok(SaveReceipt {
            saved_at,
            context: persisted,
        })
    }

    async fn load(&self, key: &ContextKey) -> Result<Option<StoredContext>, StorageError> {
        if !self.available {
            return Ok(None);
        }
        self.read(&self.path_for(key)).await
    }

    async fn clear(&self, key: &ContextKey) -> Result<(), StorageError> {
        if !self.available {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                debug!(key = %key, "Cleared context file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
