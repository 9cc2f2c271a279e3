//! Durable key-value persistence for session data
//!
//! `KeyValueStore` is the port the session layer writes through. Two
//! backends ship with the crate: `FileStore`, a JSON object on disk written
//! with temp-file + rename, and `MemoryStore` for tests and embedders that
//! manage persistence themselves.
//!
//! Uses `Pin<Box<dyn Future>>` return types so the store can be held as
//! `Arc<dyn KeyValueStore>`.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `KeyValueStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Origin-scoped string storage, in the shape of a browser's local storage.
pub trait KeyValueStore: Send + Sync {
    /// Read one key.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Write several keys in one step. Backends that persist to disk must
    /// make the batch visible atomically.
    fn put(&self, entries: Vec<(String, String)>) -> StoreFuture<'_, ()>;

    /// Remove several keys in one step. Missing keys are not an error.
    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()>;
}

/// In-process store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored key, for assertions.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn put(&self, entries: Vec<(String, String)>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.entries.lock().await.extend(entries);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            for key in keys {
                entries.remove(*key);
            }
            Ok(())
        })
    }
}

/// JSON-file store.
///
/// The file holds a flat `{ "key": "value" }` object. The tokio Mutex
/// serializes writers so a refresh landing during a sign-out cannot
/// interleave two partial writes.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, creating an empty one if the file doesn't
    /// exist yet.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "opened session store");
            entries
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Io(format!("creating session directory: {e}")))?;
            }
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn put(&self, entries: Vec<(String, String)>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.extend(entries);
            write_atomic(&self.path, &next).await?;
            *state = next;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !keys.iter().any(|k| state.contains_key(*k)) {
                return Ok(());
            }
            let mut next = state.clone();
            for key in keys {
                next.remove(*key);
            }
            write_atomic(&self.path, &next).await?;
            *state = next;
            Ok(())
        })
    }
}

/// Write the session map to `path` via a temp file in the same directory.
/// The file holds bearer tokens, so it is created 0600 on unix.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing session: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), keys = data.len(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[tokio::test]
    async fn memory_store_put_get_remove() {
        let store = MemoryStore::new();
        store
            .put(vec![entry("access_token", "A1"), entry("refresh_token", "R1")])
            .await
            .unwrap();
        assert_eq!(
            store.get("access_token").await.unwrap().as_deref(),
            Some("A1")
        );

        store.remove(&["access_token", "missing"]).await.unwrap();
        assert!(store.get("access_token").await.unwrap().is_none());
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        assert_eq!(store.path(), path.as_path());
        store.put(vec![entry("access_token", "A1")]).await.unwrap();

        let reopened = FileStore::open(path).await.unwrap();
        assert_eq!(
            reopened.get("access_token").await.unwrap().as_deref(),
            Some("A1")
        );
    }

    #[tokio::test]
    async fn file_store_cold_start_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        assert!(!path.exists());
        FileStore::open(path.clone()).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn file_store_remove_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store
            .put(vec![entry("access_token", "A1"), entry("user", "{}")])
            .await
            .unwrap();
        store.remove(&["access_token", "user"]).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!contents.contains("A1"), "old token left on disk: {contents}");
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileStore::open(path).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::open(path.clone()).await.unwrap();
        store.put(vec![entry("access_token", "A1")]).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_puts_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = Arc::new(FileStore::open(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put(vec![(format!("key-{i}"), i.to_string())])
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 10);
    }
}
