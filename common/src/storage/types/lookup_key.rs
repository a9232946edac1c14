use std::fmt;

use serde::{Deserialize, Serialize};

use super::pair_row::PairId;

/// Which expansion capability a lookup goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionKind {
    /// Exact synthon match.
    Pure,
    /// Pharmacophore-similar synthons, excluding the exact match.
    Impure,
}

impl ExpansionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpansionKind::Pure => "pure",
            ExpansionKind::Impure => "impure",
        }
    }
}

impl fmt::Display for ExpansionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic unit of work: expand `subnode` of fragment A with `synthon` of fragment B.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub pair_id: PairId,
    pub subnode: String,
    pub synthon: String,
}

impl LookupKey {
    pub fn new(pair_id: PairId, subnode: impl Into<String>, synthon: impl Into<String>) -> Self {
        Self {
            pair_id,
            subnode: subnode.into(),
            synthon: synthon.into(),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} + {}", self.pair_id, self.subnode, self.synthon)
    }
}
