mod neo4j;

pub use neo4j::Neo4jBackend;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use common::{
    error::BackendError,
    storage::types::{ExpansionKind, ImpureTuple, PureTuple},
};

use crate::fingerprints::FingerprintProvider;

/// Expansion capabilities of the fragment graph.
///
/// Implementations may be slow and may fail; a failure names the lookup that caused it.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Compounds reachable from `anchor` within `hop_limit` hops that carry `synthon` exactly.
    /// A `result_limit` of 0 means unlimited.
    async fn expand_pure(
        &self,
        anchor: &str,
        synthon: &str,
        hop_limit: u32,
        result_limit: u32,
    ) -> Result<Vec<PureTuple>, BackendError>;

    /// Like [`QueryBackend::expand_pure`], but matches synthons whose fingerprint similarity to
    /// `fingerprint` reaches `similarity_threshold`, excluding `synthon` itself.
    async fn expand_impure(
        &self,
        anchor: &str,
        synthon: &str,
        hop_limit: u32,
        result_limit: u32,
        similarity_threshold: f64,
        fingerprint: &[f64],
    ) -> Result<Vec<ImpureTuple>, BackendError>;
}

/// Which capability a run uses, with what the impure variant needs.
#[derive(Clone)]
pub enum ExpansionMode {
    Pure,
    Impure {
        similarity_threshold: f64,
        fingerprints: Arc<dyn FingerprintProvider>,
    },
}

impl ExpansionMode {
    pub fn kind(&self) -> ExpansionKind {
        match self {
            ExpansionMode::Pure => ExpansionKind::Pure,
            ExpansionMode::Impure { .. } => ExpansionKind::Impure,
        }
    }
}

impl fmt::Debug for ExpansionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionMode::Pure => f.write_str("Pure"),
            ExpansionMode::Impure {
                similarity_threshold,
                ..
            } => f
                .debug_struct("Impure")
                .field("similarity_threshold", similarity_threshold)
                .finish_non_exhaustive(),
        }
    }
}

/// Backend for cache-only runs where no graph connection is configured.
pub struct DetachedBackend;

impl DetachedBackend {
    fn refuse(anchor: &str, synthon: &str) -> BackendError {
        BackendError::new(anchor, synthon, "no graph backend configured")
    }
}

#[async_trait]
impl QueryBackend for DetachedBackend {
    async fn expand_pure(
        &self,
        anchor: &str,
        synthon: &str,
        _hop_limit: u32,
        _result_limit: u32,
    ) -> Result<Vec<PureTuple>, BackendError> {
        Err(Self::refuse(anchor, synthon))
    }

    async fn expand_impure(
        &self,
        anchor: &str,
        synthon: &str,
        _hop_limit: u32,
        _result_limit: u32,
        _similarity_threshold: f64,
        _fingerprint: &[f64],
    ) -> Result<Vec<ImpureTuple>, BackendError> {
        Err(Self::refuse(anchor, synthon))
    }
}
