use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Directory below `output_dir` that holds cached expansion results.
pub const CACHE_DIR_NAME: &str = "cache";

/// Durable key/value storage shared by every run pointed at the same cache directory.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    /// Create the backend described by the configuration.
    ///
    /// For the local backend the cache directory is created when missing.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let (store, local_base) = create_storage_backend(cfg).await?;
        Ok(Self { store, local_base })
    }

    /// Local filesystem storage rooted at an explicit directory.
    pub async fn local(base: impl Into<PathBuf>) -> object_store::Result<Self> {
        let base = base.into();
        let store = open_local(&base).await?;
        Ok(Self {
            store,
            local_base: Some(base),
        })
    }

    /// Volatile storage, mainly for tests.
    pub fn memory() -> Self {
        Self::with_backend(Arc::new(InMemory::new()))
    }

    /// Wrap a caller-provided backend.
    pub fn with_backend(store: DynStore) -> Self {
        Self {
            store,
            local_base: None,
        }
    }

    /// Resolved base directory when using the local backend.
    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    /// Store bytes at `location`, replacing any previous content.
    ///
    /// The local backend stages the write in a temporary file and renames it
    /// into place, so readers never observe a partial entry.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Fetch the bytes at `location`, or `None` when nothing was stored there.
    pub async fn get(&self, location: &str) -> object_store::Result<Option<Bytes>> {
        let path = ObjPath::from(location);
        match self.store.get(&path).await {
            Ok(result) => result.bytes().await.map(Some),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// List all objects below the specified prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }
}

async fn open_local(base: &Path) -> object_store::Result<DynStore> {
    if !base.exists() {
        tokio::fs::create_dir_all(base)
            .await
            .map_err(|e| object_store::Error::Generic {
                store: "LocalFileSystem",
                source: e.into(),
            })?;
    }
    let store = LocalFileSystem::new_with_prefix(base)?;
    Ok(Arc::new(store))
}

async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_cache_dir(cfg);
            let store = open_local(&base).await?;
            Ok((store, Some(base)))
        }
        StorageKind::Memory => Ok((Arc::new(InMemory::new()), None)),
    }
}

/// Absolute output directory; relative values resolve against the working directory.
pub fn resolve_output_dir(cfg: &AppConfig) -> PathBuf {
    let dir = PathBuf::from(&cfg.output_dir);
    if dir.is_absolute() {
        dir
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir)
    }
}

pub fn resolve_cache_dir(cfg: &AppConfig) -> PathBuf {
    resolve_output_dir(cfg).join(CACHE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_put_get_and_missing() {
        let storage = StorageManager::memory();
        assert!(storage.local_base_path().is_none());

        storage
            .put("pure_abc_2_0.json", Bytes::from_static(b"[]"))
            .await
            .expect("put");
        let stored = storage.get("pure_abc_2_0.json").await.expect("get");
        assert_eq!(stored.as_deref(), Some(&b"[]"[..]));

        assert!(storage.get("absent.json").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn local_storage_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("cache");

        let first = StorageManager::local(&base).await.expect("open local");
        first
            .put("entry.json", Bytes::from_static(b"[1]"))
            .await
            .expect("put");
        drop(first);

        let second = StorageManager::local(&base).await.expect("reopen local");
        assert_eq!(second.local_base_path(), Some(base.as_path()));
        let stored = second.get("entry.json").await.expect("get");
        assert_eq!(stored.as_deref(), Some(&b"[1]"[..]));
        assert_eq!(second.list(None).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn config_places_cache_under_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = AppConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let storage = StorageManager::new(&cfg).await.expect("storage");
        assert_eq!(
            storage.local_base_path(),
            Some(dir.path().join(CACHE_DIR_NAME).as_path())
        );
        assert!(dir.path().join(CACHE_DIR_NAME).is_dir());
    }
}
