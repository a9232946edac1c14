use std::collections::HashSet;

use common::storage::types::{LookupKey, PairTable};
use tracing::debug;

/// Unique lookup keys of the pairs table.
///
/// Rows are visited in input order, then subnodes, then synthons; the first
/// occurrence of a key wins. Empty subnode or synthon lists contribute nothing.
pub fn derive_lookup_keys(pairs: &PairTable) -> Vec<LookupKey> {
    let capacity: usize = pairs
        .rows()
        .iter()
        .map(|row| row.subnodes_a.len() * row.synthons_b.len())
        .sum();
    let mut seen: HashSet<LookupKey> = HashSet::with_capacity(capacity);
    let mut keys = Vec::with_capacity(capacity);

    for row in pairs.rows() {
        for subnode in &row.subnodes_a {
            for synthon in &row.synthons_b {
                let key = LookupKey::new(row.pair_id.clone(), subnode.as_str(), synthon.as_str());
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
    }

    debug!(
        rows = pairs.len(),
        candidates = capacity,
        unique_keys = keys.len(),
        "derived lookup keys"
    );
    keys
}
