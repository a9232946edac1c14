use common::{
    error::AppError,
    storage::types::{ExpansionKind, ExpansionResult, LookupKey},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::pipeline::KeyOutcome;

/// One candidate merge with the lookup it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRecord {
    pair_id_a: String,
    pair_id_b: String,
    subnode: String,
    synthon: String,
    merge_string: String,
    source_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_synthon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity_score: Option<f64>,
}

impl MergeRecord {
    pub fn pair_id_a(&self) -> &str {
        &self.pair_id_a
    }

    pub fn pair_id_b(&self) -> &str {
        &self.pair_id_b
    }

    pub fn subnode(&self) -> &str {
        &self.subnode
    }

    pub fn synthon(&self) -> &str {
        &self.synthon
    }

    pub fn merge_string(&self) -> &str {
        &self.merge_string
    }

    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    pub fn source_synthon(&self) -> Option<&str> {
        self.source_synthon.as_deref()
    }

    pub fn similarity_score(&self) -> Option<f64> {
        self.similarity_score
    }

    fn from_key(key: &LookupKey, merge_string: String, source_ids: Vec<String>) -> Self {
        Self {
            pair_id_a: key.pair_id.id_a.clone(),
            pair_id_b: key.pair_id.id_b.clone(),
            subnode: key.subnode.clone(),
            synthon: key.synthon.clone(),
            merge_string,
            source_ids,
            source_synthon: None,
            similarity_score: None,
        }
    }
}

/// Non-empty, ordered set of merge records of a single expansion kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeTable {
    kind: ExpansionKind,
    records: Vec<MergeRecord>,
}

impl MergeTable {
    pub fn kind(&self) -> ExpansionKind {
        self.kind
    }

    pub fn records(&self) -> &[MergeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<MergeRecord> {
        self.records
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Merges(MergeTable),
    /// Every key resolved to nothing, was skipped, or failed.
    Empty,
}

/// Flatten per-key outcomes into merge records, keys in input order, tuples in result order.
pub fn aggregate(
    kind: ExpansionKind,
    keys: &[LookupKey],
    outcomes: &[KeyOutcome],
) -> Result<Aggregation, AppError> {
    if keys.len() != outcomes.len() {
        return Err(AppError::InternalError(format!(
            "{} outcomes for {} lookup keys",
            outcomes.len(),
            keys.len()
        )));
    }

    let mut records = Vec::new();
    let mut skipped = 0_usize;
    let mut failed = 0_usize;

    for (key, outcome) in keys.iter().zip(outcomes) {
        match outcome {
            KeyOutcome::Resolved(ExpansionResult::Pure(tuples)) => {
                records.extend(tuples.iter().map(|tuple| {
                    MergeRecord::from_key(key, tuple.merge_smiles.clone(), tuple.source_ids.clone())
                }));
            }
            KeyOutcome::Resolved(ExpansionResult::Impure(tuples)) => {
                records.extend(tuples.iter().map(|tuple| MergeRecord {
                    source_synthon: Some(tuple.source_synthon.clone()),
                    similarity_score: Some(tuple.similarity),
                    ..MergeRecord::from_key(key, tuple.merge_smiles.clone(), tuple.source_ids.clone())
                }));
            }
            KeyOutcome::Skipped => {
                skipped = skipped.saturating_add(1);
                warn!(lookup = %key, "no cached expansion, key contributes no merges");
            }
            KeyOutcome::Failed(err) => {
                failed = failed.saturating_add(1);
                warn!(lookup = %key, error = %err, "failed expansion contributes no merges");
            }
        }
    }

    info!(
        records = records.len(),
        skipped,
        failed,
        "aggregated merge records"
    );

    if records.is_empty() {
        return Ok(Aggregation::Empty);
    }
    Ok(Aggregation::Merges(MergeTable { kind, records }))
}
