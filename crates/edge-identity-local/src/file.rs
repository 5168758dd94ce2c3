use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use edge_identity::{KeyValueStore, StoreError, StoreResult, StoreVisitor};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// Crash-safe key-value store persisted as a single JSON snapshot file.
///
/// Every `put` rewrites the snapshot to a temporary file, syncs it and renames
/// it over the previous one, so a crash leaves either the old or the new
/// snapshot on disk and never a torn one. The in-memory copy is only updated
/// after the rename succeeds.
///
/// Suited to the few thousand identities an edge gateway holds; every write is
/// O(n) in the number of entries.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, loading the existing snapshot if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed, or if
    /// its version is unsupported.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(StoreError::serialization(format!(
                        "unsupported snapshot version {} in {}",
                        snapshot.version,
                        path.display()
                    )));
                }
                snapshot.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = entries.len(), "Opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            entries,
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = bytes.len(), "Persisted file store snapshot");
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, String>,
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;

        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.persist(&next).await?;

        *entries = next;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn iterate_all(&self, visitor: &mut StoreVisitor<'_>) -> StoreResult<()> {
        let entries = self.entries.lock().await.clone();
        for (key, value) in entries {
            visitor(key, value);
        }
        Ok(())
    }
}
