use std::{collections::HashSet, fmt, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Columns every record of the pairs relation must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["id_a", "id_b", "subnodes_A", "synthons_B"];

/// Ordered pair of source fragment identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairId {
    pub id_a: String,
    pub id_b: String,
}

impl PairId {
    pub fn new(id_a: impl Into<String>, id_b: impl Into<String>) -> Self {
        Self {
            id_a: id_a.into(),
            id_b: id_b.into(),
        }
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id_a, self.id_b)
    }
}

/// One row of the pairs relation: the subnodes of fragment A and the synthons of fragment B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRow {
    pub pair_id: PairId,
    pub subnodes_a: Vec<String>,
    pub synthons_b: Vec<String>,
}

/// The pairs relation, validated: every row complete, every `pair_id` unique.
#[derive(Debug, Clone, Default)]
pub struct PairTable {
    rows: Vec<PairRow>,
}

impl PairTable {
    pub fn from_rows(rows: Vec<PairRow>) -> Result<Self, AppError> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert(&row.pair_id) {
                return Err(AppError::MalformedInput(format!(
                    "duplicate pair id {}",
                    row.pair_id
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Parse a JSON array of records carrying [`REQUIRED_COLUMNS`].
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|err| AppError::MalformedInput(format!("pairs are not valid JSON: {err}")))?;
        let Value::Array(records) = value else {
            return Err(AppError::MalformedInput(
                "pairs must be a JSON array of records".into(),
            ));
        };

        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| match record {
                Value::Object(fields) => parse_row(index, fields),
                _ => Err(AppError::MalformedInput(format!(
                    "row {index}: expected a JSON object"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_rows(rows)
    }

    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read(path).await?;
        Self::from_json_slice(&raw)
    }

    pub fn rows(&self) -> &[PairRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_row(index: usize, fields: &Map<String, Value>) -> Result<PairRow, AppError> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !fields.contains_key(*column))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MalformedInput(format!(
            "row {index}: missing column(s) {}",
            missing.join(", ")
        )));
    }

    Ok(PairRow {
        pair_id: PairId::new(
            identifier(index, "id_a", &fields["id_a"])?,
            identifier(index, "id_b", &fields["id_b"])?,
        ),
        subnodes_a: string_list(index, "subnodes_A", &fields["subnodes_A"])?,
        synthons_b: string_list(index, "synthons_B", &fields["synthons_B"])?,
    })
}

// Compound ids arrive as strings or as integer indices.
fn identifier(index: usize, column: &str, value: &Value) -> Result<String, AppError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(number.to_string()),
        other => Err(AppError::MalformedInput(format!(
            "row {index}: column {column} must be a string or integer, got {other}"
        ))),
    }
}

fn string_list(index: usize, column: &str, value: &Value) -> Result<Vec<String>, AppError> {
    let Value::Array(items) = value else {
        return Err(AppError::MalformedInput(format!(
            "row {index}: column {column} must be an array of strings"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                AppError::MalformedInput(format!(
                    "row {index}: column {column} contains a non-string entry {item}"
                ))
            })
        })
        .collect()
}
