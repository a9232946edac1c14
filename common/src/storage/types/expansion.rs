use serde::{Deserialize, Serialize};

use super::lookup_key::ExpansionKind;

/// Compound reached through an exact synthon match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PureTuple {
    pub source_ids: Vec<String>,
    pub merge_smiles: String,
}

/// Compound reached through a similar synthon, with the synthon it actually carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpureTuple {
    pub merge_smiles: String,
    pub source_synthon: String,
    pub similarity: f64,
    pub source_ids: Vec<String>,
}

/// Ordered answer of one expansion query.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionResult {
    Pure(Vec<PureTuple>),
    Impure(Vec<ImpureTuple>),
}

impl ExpansionResult {
    pub fn empty(kind: ExpansionKind) -> Self {
        match kind {
            ExpansionKind::Pure => ExpansionResult::Pure(Vec::new()),
            ExpansionKind::Impure => ExpansionResult::Impure(Vec::new()),
        }
    }

    pub fn kind(&self) -> ExpansionKind {
        match self {
            ExpansionResult::Pure(_) => ExpansionKind::Pure,
            ExpansionResult::Impure(_) => ExpansionKind::Impure,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ExpansionResult::Pure(tuples) => tuples.len(),
            ExpansionResult::Impure(tuples) => tuples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the tuple list as one JSON array, order preserved.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            ExpansionResult::Pure(tuples) => serde_json::to_vec(tuples),
            ExpansionResult::Impure(tuples) => serde_json::to_vec(tuples),
        }
    }

    /// Inverse of [`Self::to_json_bytes`]; the array itself does not record its kind.
    pub fn from_json_bytes(kind: ExpansionKind, raw: &[u8]) -> Result<Self, serde_json::Error> {
        match kind {
            ExpansionKind::Pure => serde_json::from_slice(raw).map(ExpansionResult::Pure),
            ExpansionKind::Impure => serde_json::from_slice(raw).map(ExpansionResult::Impure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_tuple_order_and_kind() {
        let result = ExpansionResult::Impure(vec![
            ImpureTuple {
                merge_smiles: "CCN".into(),
                source_synthon: "[Xe]N".into(),
                similarity: 0.93,
                source_ids: vec!["Z1".into()],
            },
            ImpureTuple {
                merge_smiles: "CCO".into(),
                source_synthon: "[Xe]O".into(),
                similarity: 0.91,
                source_ids: vec!["Z2".into(), "Z3".into()],
            },
        ]);
        let raw = result.to_json_bytes().expect("serialize");
        assert!(raw.starts_with(b"["));
        let decoded =
            ExpansionResult::from_json_bytes(ExpansionKind::Impure, &raw).expect("deserialize");
        assert_eq!(decoded, result);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn pure_array_does_not_decode_as_impure() {
        let result = ExpansionResult::Pure(vec![PureTuple {
            source_ids: vec!["Z1".into()],
            merge_smiles: "CCN".into(),
        }]);
        let raw = result.to_json_bytes().expect("serialize");
        assert!(ExpansionResult::from_json_bytes(ExpansionKind::Impure, &raw).is_err());
        assert!(ExpansionResult::empty(ExpansionKind::Pure).is_empty());
    }
}
