use std::fmt;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        store::StorageManager,
        types::{ExpansionKind, ExpansionResult},
    },
};

/// Storage identifier of one memoized expansion.
///
/// Rendered as `{mode}_{digest}_{hop_limit}_{result_limit}`. The digest covers the
/// length-prefixed subnode and synthon, so SMILES punctuation never reaches a file
/// name and no two (subnode, synthon) pairs share a digest by concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: ExpansionKind,
    id: String,
}

impl CacheKey {
    pub fn derive(
        kind: ExpansionKind,
        subnode: &str,
        synthon: &str,
        hop_limit: u32,
        result_limit: u32,
    ) -> Self {
        let mut hasher = Sha256::new();
        for part in [subnode, synthon] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let id = format!("{kind}_{digest:x}_{hop_limit}_{result_limit}");
        Self { kind, id }
    }

    pub fn kind(&self) -> ExpansionKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    fn location(&self) -> String {
        format!("{}.json", self.id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Durable memo of expansion results keyed by [`CacheKey`].
///
/// Holds no state of its own; concurrent readers and distinct-key writers go straight
/// to the storage backend. Two writers racing on the same key store identical content.
#[derive(Clone)]
pub struct ExpansionCache {
    storage: StorageManager,
}

impl ExpansionCache {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    /// Previously stored result for `key`; never computes anything.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<ExpansionResult>, AppError> {
        let stored = self
            .storage
            .get(&key.location())
            .await
            .map_err(|err| AppError::CacheStorage(format!("reading {key}: {err}")))?;

        let Some(raw) = stored else {
            debug!(cache_key = %key, "cache miss");
            return Ok(None);
        };

        let result = ExpansionResult::from_json_bytes(key.kind(), &raw)
            .map_err(|err| AppError::CacheStorage(format!("corrupt entry {key}: {err}")))?;
        debug!(cache_key = %key, tuples = result.len(), "cache hit");
        Ok(Some(result))
    }

    pub async fn put(&self, key: &CacheKey, result: &ExpansionResult) -> Result<(), AppError> {
        if result.kind() != key.kind() {
            return Err(AppError::InternalError(format!(
                "refusing to store a {} result under {key}",
                result.kind()
            )));
        }
        let body = result.to_json_bytes()?;
        self.storage
            .put(&key.location(), Bytes::from(body))
            .await
            .map_err(|err| AppError::CacheStorage(format!("writing {key}: {err}")))?;
        debug!(cache_key = %key, tuples = result.len(), "cache write");
        Ok(())
    }

    /// Number of stored entries.
    pub async fn entry_count(&self) -> Result<usize, AppError> {
        let entries = self
            .storage
            .list(None)
            .await
            .map_err(|err| AppError::CacheStorage(format!("listing cache: {err}")))?;
        Ok(entries
            .iter()
            .filter(|meta| meta.location.as_ref().ends_with(".json"))
            .count())
    }
}
