use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use common::{
    error::{AppError, BackendError},
    storage::types::{ImpureTuple, PureTuple},
    utils::config::{AppConfig, GraphCredentials},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::QueryBackend;

/// Maximum depth of the decomposition walk used by the subnode lookup.
const SUBNODE_MAX_DEPTH: u32 = 20;

/// Fragment network served over the Neo4j HTTP transactional Cypher endpoint.
///
/// Graph layout: `F2` fragment nodes keyed by `smiles`, `FRAG` edges pointing from a
/// parent to its child fragment and carrying `prop_synthon` (and, for similarity
/// search, `prop_pharmfp`), and purchasable `Mol` compounds linked to
/// `Available` catalogue entries through `IS_AVAILABLE`.
pub struct Neo4jBackend {
    http: Client,
    endpoint: String,
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jBackend {
    pub fn new(credentials: &GraphCredentials, timeout: Duration) -> Result<Self, AppError> {
        let location = credentials.location.trim_end_matches('/');
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "graph_location must be an http(s) URL of the Neo4j HTTP endpoint, got {location}"
            )));
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{location}/db/{}/tx/commit", credentials.database),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let credentials = config.graph_credentials()?;
        Self::new(
            &credentials,
            Duration::from_secs(config.graph_timeout_secs),
        )
    }

    /// Fragments reachable from `smiles` through the decomposition edges, deduplicated and sorted.
    /// With `terminal_only`, fragments that can still be decomposed are left out.
    #[instrument(skip(self))]
    pub async fn subnodes(&self, smiles: &str, terminal_only: bool) -> Result<Vec<String>, AppError> {
        let rows = self
            .run(subnode_statement(terminal_only), json!({ "smiles": smiles }))
            .await
            .map_err(|message| {
                AppError::InternalError(format!("subnode lookup for {smiles} failed: {message}"))
            })?;
        parse_smiles_rows(rows).map_err(|message| {
            AppError::InternalError(format!("subnode lookup for {smiles} failed: {message}"))
        })
    }

    async fn run(&self, statement: String, parameters: Value) -> Result<Vec<Vec<Value>>, String> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("graph endpoint returned {status}: {detail}"));
        }

        let payload: TxResponse = response
            .json()
            .await
            .map_err(|err| format!("unreadable graph response: {err}"))?;
        collect_rows(payload)
    }
}

#[async_trait]
impl QueryBackend for Neo4jBackend {
    async fn expand_pure(
        &self,
        anchor: &str,
        synthon: &str,
        hop_limit: u32,
        result_limit: u32,
    ) -> Result<Vec<PureTuple>, BackendError> {
        let rows = self
            .run(
                pure_statement(hop_limit, result_limit),
                json!({ "anchor": anchor, "synthon": synthon }),
            )
            .await
            .map_err(|message| BackendError::new(anchor, synthon, message))?;
        let tuples =
            parse_pure_rows(rows).map_err(|message| BackendError::new(anchor, synthon, message))?;
        debug!(anchor, synthon, tuples = tuples.len(), "pure expansion answered");
        Ok(tuples)
    }

    async fn expand_impure(
        &self,
        anchor: &str,
        synthon: &str,
        hop_limit: u32,
        result_limit: u32,
        similarity_threshold: f64,
        fingerprint: &[f64],
    ) -> Result<Vec<ImpureTuple>, BackendError> {
        let rows = self
            .run(
                impure_statement(hop_limit, result_limit),
                json!({
                    "anchor": anchor,
                    "synthon": synthon,
                    "threshold": similarity_threshold,
                    "fingerprint": fingerprint,
                }),
            )
            .await
            .map_err(|message| BackendError::new(anchor, synthon, message))?;
        let tuples = parse_impure_rows(rows)
            .map_err(|message| BackendError::new(anchor, synthon, message))?;
        debug!(anchor, synthon, tuples = tuples.len(), "impure expansion answered");
        Ok(tuples)
    }
}

fn collect_rows(payload: TxResponse) -> Result<Vec<Vec<Value>>, String> {
    if let Some(error) = payload.errors.first() {
        return Err(format!("{}: {}", error.code, error.message));
    }
    Ok(payload
        .results
        .into_iter()
        .flat_map(|result| result.data)
        .map(|data| data.row)
        .collect())
}

// Variable-length bounds cannot be parameters in Cypher, so they are rendered into the text.
fn limit_clause(result_limit: u32) -> String {
    if result_limit == 0 {
        String::new()
    } else {
        format!("\nLIMIT {result_limit}")
    }
}

fn pure_statement(hop_limit: u32, result_limit: u32) -> String {
    format!(
        "MATCH (fa:F2 {{smiles: $anchor}})-[:FRAG*0..{hop_limit}]-(:F2)<-[e:FRAG]-(c:Mol)
WHERE e.prop_synthon = $synthon
WITH DISTINCT c
MATCH (c)-[:IS_AVAILABLE]->(a:Available)
WITH c, collect(DISTINCT a.cmpd_id) AS ids
RETURN ids, c.smiles
ORDER BY c.smiles{}",
        limit_clause(result_limit)
    )
}

fn impure_statement(hop_limit: u32, result_limit: u32) -> String {
    format!(
        "MATCH (fa:F2 {{smiles: $anchor}})-[:FRAG*0..{hop_limit}]-(:F2)<-[e:FRAG]-(c:Mol)
WHERE e.prop_synthon <> $synthon AND e.prop_pharmfp IS NOT NULL
WITH c, e.prop_synthon AS source_synthon,
     gds.similarity.cosine(e.prop_pharmfp, $fingerprint) AS similarity
WHERE similarity >= $threshold
WITH DISTINCT c, source_synthon, similarity
MATCH (c)-[:IS_AVAILABLE]->(a:Available)
WITH c, source_synthon, similarity, collect(DISTINCT a.cmpd_id) AS ids
RETURN c.smiles, source_synthon, similarity, ids
ORDER BY similarity DESC, c.smiles, source_synthon{}",
        limit_clause(result_limit)
    )
}

fn subnode_statement(terminal_only: bool) -> String {
    let terminal_filter = if terminal_only {
        "\nWHERE NOT ()-[:FRAG]-(f)-[:FRAG]->()"
    } else {
        ""
    };
    format!(
        "MATCH (:F2 {{smiles: $smiles}})-[:FRAG*0..{SUBNODE_MAX_DEPTH}]->(f:F2){terminal_filter}
RETURN DISTINCT f.smiles"
    )
}

fn text_cell(row: &[Value], index: usize) -> Result<String, String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| format!("column {index} is not a string in {row:?}"))
}

fn id_list_cell(row: &[Value], index: usize) -> Result<Vec<String>, String> {
    let items = row
        .get(index)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("column {index} is not a list in {row:?}"))?;
    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .collect())
}

// Rows without any catalogue identifier carry no provenance and are dropped.
fn parse_pure_rows(rows: Vec<Vec<Value>>) -> Result<Vec<PureTuple>, String> {
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let source_ids = id_list_cell(&row, 0)?;
        if source_ids.is_empty() {
            continue;
        }
        tuples.push(PureTuple {
            source_ids,
            merge_smiles: text_cell(&row, 1)?,
        });
    }
    Ok(tuples)
}

fn parse_impure_rows(rows: Vec<Vec<Value>>) -> Result<Vec<ImpureTuple>, String> {
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let source_ids = id_list_cell(&row, 3)?;
        if source_ids.is_empty() {
            continue;
        }
        let similarity = row
            .get(2)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("column 2 is not a number in {row:?}"))?;
        tuples.push(ImpureTuple {
            merge_smiles: text_cell(&row, 0)?,
            source_synthon: text_cell(&row, 1)?,
            similarity,
            source_ids,
        });
    }
    Ok(tuples)
}

fn parse_smiles_rows(rows: Vec<Vec<Value>>) -> Result<Vec<String>, String> {
    let unique = rows
        .iter()
        .map(|row| text_cell(row, 0))
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(unique.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(location: &str) -> GraphCredentials {
        GraphCredentials {
            location: location.into(),
            username: "neo4j".into(),
            password: "secret".into(),
            database: "fragments".into(),
        }
    }

    #[test]
    fn endpoint_targets_the_configured_database() {
        let backend = Neo4jBackend::new(&credentials("http://graph:7474/"), Duration::from_secs(5))
            .expect("backend");
        assert_eq!(backend.endpoint, "http://graph:7474/db/fragments/tx/commit");
    }

    #[test]
    fn non_http_locations_are_configuration_errors() {
        let result = Neo4jBackend::new(&credentials("bolt://graph:7687"), Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn statements_render_hop_and_result_limits() {
        let unlimited = pure_statement(3, 0);
        assert!(unlimited.contains("[:FRAG*0..3]"));
        assert!(!unlimited.contains("LIMIT"));

        let limited = impure_statement(2, 25);
        assert!(limited.contains("[:FRAG*0..2]"));
        assert!(limited.trim_end().ends_with("LIMIT 25"));
        assert!(limited.contains("e.prop_synthon <> $synthon"));

        assert!(subnode_statement(true).contains("WHERE NOT"));
        assert!(!subnode_statement(false).contains("WHERE NOT"));
    }

    #[test]
    fn transaction_errors_surface_their_code() {
        let payload: TxResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]
        }))
        .expect("payload");
        let err = collect_rows(payload).expect_err("error");
        assert!(err.starts_with("Neo.ClientError.Statement.SyntaxError"));
    }

    #[test]
    fn pure_rows_keep_order_and_drop_rows_without_ids() {
        let payload: TxResponse = serde_json::from_value(json!({
            "results": [{"columns": ["ids", "c.smiles"], "data": [
                {"row": [["Z1", "EN2"], "CCN"], "meta": []},
                {"row": [[], "CCO"], "meta": []},
                {"row": [[42], "CCS"], "meta": []}
            ]}],
            "errors": []
        }))
        .expect("payload");
        let tuples = parse_pure_rows(collect_rows(payload).expect("rows")).expect("tuples");
        assert_eq!(
            tuples,
            vec![
                PureTuple {
                    source_ids: vec!["Z1".into(), "EN2".into()],
                    merge_smiles: "CCN".into(),
                },
                PureTuple {
                    source_ids: vec!["42".into()],
                    merge_smiles: "CCS".into(),
                },
            ]
        );
    }

    #[test]
    fn impure_rows_carry_source_synthon_and_similarity() {
        let rows = vec![vec![json!("CCN"), json!("[Xe]NC"), json!(0.93), json!(["Z9"])]];
        let tuples = parse_impure_rows(rows).expect("tuples");
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].source_synthon, "[Xe]NC");
        assert!((tuples[0].similarity - 0.93).abs() < f64::EPSILON);

        let malformed = vec![vec![json!("CCN"), json!("[Xe]NC"), json!("high"), json!(["Z9"])]];
        assert!(parse_impure_rows(malformed).is_err());
    }

    #[test]
    fn subnode_rows_are_deduplicated() {
        let rows = vec![vec![json!("CC")], vec![json!("c1ccccc1")], vec![json!("CC")]];
        assert_eq!(
            parse_smiles_rows(rows).expect("smiles"),
            vec!["CC".to_owned(), "c1ccccc1".to_owned()]
        );
    }
}
