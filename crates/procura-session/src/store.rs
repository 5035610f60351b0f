//! Durable storage for the session token.
//!
//! On a phone this is the OS keychain; on a desktop or in tests it can be
//! a directory or plain memory. The session manager only needs three
//! operations on string values, so that's all the trait asks for.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::StoreError;

/// Key-value secret storage.
///
/// Deleting a key that doesn't exist is not an error: logout must be
/// idempotent, and so must the store underneath it.
pub trait CredentialStore: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-process store. Clones share the same map, so a test can keep a
/// handle and inspect what the session manager wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One file per key under a directory.
///
/// Writes go to a hidden temporary file that is then renamed over the
/// target, so a crash mid-write leaves either the old token or the new
/// one, never half of each. On Unix the file is readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// The directory is created lazily on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl CredentialStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // A leftover from a crashed write may carry a looser mode, and
        // `mode` only applies to files this call creates.
        let tmp = self.dir.join(format!(".{key}.tmp"));
        match tokio::fs::remove_file(&tmp).await {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_delete() {
        let store = MemoryStore::new();

        store.set("userToken", "abc").await.unwrap();
        assert_eq!(store.get("userToken").await.unwrap().as_deref(), Some("abc"));

        store.delete("userToken").await.unwrap();
        assert_eq!(store.get("userToken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let handle = store.clone();

        store.set("userToken", "abc").await.unwrap();

        assert_eq!(handle.get("userToken").await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_file_store_round_trip_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("creds"));

        store.set("userToken", "abc.def.ghi").await.unwrap();

        // A fresh instance over the same directory is a "cold start".
        let reopened = FileStore::new(dir.path().join("creds"));
        assert_eq!(
            reopened.get("userToken").await.unwrap().as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[tokio::test]
    async fn test_file_store_overwrite_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("userToken", "first").await.unwrap();
        store.set("userToken", "second").await.unwrap();

        assert_eq!(store.get("userToken").await.unwrap().as_deref(), Some("second"));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["userToken".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_missing_key_is_none_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert_eq!(store.get("userToken").await.unwrap(), None);
        store.delete("userToken").await.expect("first delete");
        store.delete("userToken").await.expect("second delete");
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for key in ["", "../escape", ".hidden", "a/b"] {
            assert!(
                matches!(store.set(key, "x").await, Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("userToken", "secret").await.unwrap();

        let mode = std::fs::metadata(dir.path().join("userToken"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_replaces_world_readable_leftover() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join(".userToken.tmp");
        std::fs::write(&leftover, "half-written").unwrap();
        std::fs::set_permissions(&leftover, std::fs::Permissions::from_mode(0o644))
            .unwrap();
        let store = FileStore::new(dir.path());

        store.set("userToken", "secret").await.unwrap();

        let stored = dir.path().join("userToken");
        assert_eq!(std::fs::read_to_string(&stored).unwrap(), "secret");
        let mode = std::fs::metadata(&stored).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!leftover.exists());
    }
}
