use std::{collections::HashMap, path::Path};

use common::error::AppError;
use serde_json::Value;

/// Pharmacophore fingerprint lookup for synthons, computed outside this crate.
pub trait FingerprintProvider: Send + Sync {
    fn fingerprint(&self, synthon: &str) -> Option<&[f64]>;
}

/// Fingerprints loaded from a JSON object mapping synthon SMILES to a numeric array.
#[derive(Debug, Clone, Default)]
pub struct FingerprintTable {
    vectors: HashMap<String, Vec<f64>>,
}

impl FingerprintTable {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        Self {
            vectors: entries
                .into_iter()
                .map(|(synthon, vector)| (synthon.into(), vector))
                .collect(),
        }
    }

    pub fn from_json_slice(raw: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_json::from_slice(raw).map_err(|err| {
            AppError::MalformedInput(format!("fingerprints are not valid JSON: {err}"))
        })?;
        let Value::Object(entries) = value else {
            return Err(AppError::MalformedInput(
                "fingerprints must be a JSON object keyed by synthon".into(),
            ));
        };

        let mut vectors = HashMap::with_capacity(entries.len());
        for (synthon, vector) in entries {
            let parsed = vector
                .as_array()
                .and_then(|items| items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>())
                .ok_or_else(|| {
                    AppError::MalformedInput(format!(
                        "fingerprint for {synthon} must be an array of numbers"
                    ))
                })?;
            vectors.insert(synthon, parsed);
        }
        Ok(Self { vectors })
    }

    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read(path).await?;
        Self::from_json_slice(&raw)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl FingerprintProvider for FingerprintTable {
    fn fingerprint(&self, synthon: &str) -> Option<&[f64]> {
        self.vectors.get(synthon).map(Vec::as_slice)
    }
}
