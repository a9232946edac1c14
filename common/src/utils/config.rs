use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// File the `configure` command writes to; `get_config` picks it up as `config.json`.
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

/// What the scheduler does when a single expansion query fails.
#[derive(Clone, Copy, Deserialize, Serialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure against the key and keep going.
    #[default]
    Skip,
    /// Abort the batch on the first failed query.
    FailFast,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub graph_location: Option<String>,
    #[serde(default)]
    pub graph_username: Option<String>,
    #[serde(default)]
    pub graph_password: Option<String>,
    #[serde(default = "default_graph_database")]
    pub graph_database: String,
    #[serde(default = "default_graph_timeout_secs")]
    pub graph_timeout_secs: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default)]
    pub cached_only: bool,
    #[serde(default = "default_hop_limit")]
    pub hop_limit: u32,
    #[serde(default)]
    pub result_limit: u32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_failure_warn_ratio")]
    pub failure_warn_ratio: f64,
    #[serde(default = "default_true")]
    pub terminal_subnodes: bool,
    // The next three are kept for the tools that place and filter merges;
    // nothing in this workspace reads them.
    #[serde(default = "default_true")]
    pub terminal_synthons: bool,
    #[serde(default = "default_overlap_cutoff")]
    pub overlap_cutoff: f64,
    #[serde(default = "default_distance_cutoff")]
    pub distance_cutoff: f64,
}

fn default_graph_database() -> String {
    "neo4j".to_string()
}

fn default_graph_timeout_secs() -> u64 {
    300
}

fn default_output_dir() -> String {
    "./knitwork_output".to_string()
}

fn default_concurrency_limit() -> usize {
    8
}

fn default_hop_limit() -> u32 {
    2
}

fn default_similarity_threshold() -> f64 {
    0.9
}

fn default_failure_warn_ratio() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_overlap_cutoff() -> f64 {
    0.56
}

fn default_distance_cutoff() -> f64 {
    5.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            graph_location: None,
            graph_username: None,
            graph_password: None,
            graph_database: default_graph_database(),
            graph_timeout_secs: default_graph_timeout_secs(),
            output_dir: default_output_dir(),
            storage: default_storage_kind(),
            concurrency_limit: default_concurrency_limit(),
            cached_only: false,
            hop_limit: default_hop_limit(),
            result_limit: 0,
            similarity_threshold: default_similarity_threshold(),
            failure_policy: FailurePolicy::default(),
            failure_warn_ratio: default_failure_warn_ratio(),
            terminal_subnodes: true,
            terminal_synthons: true,
            overlap_cutoff: default_overlap_cutoff(),
            distance_cutoff: default_distance_cutoff(),
        }
    }
}

/// Connection values for the fragment graph, all present.
#[derive(Clone, Debug)]
pub struct GraphCredentials {
    pub location: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl AppConfig {
    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency_limit == 0 {
            return Err(AppError::Config(
                "concurrency_limit must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_warn_ratio) {
            return Err(AppError::Config(format!(
                "failure_warn_ratio must lie in [0, 1], got {}",
                self.failure_warn_ratio
            )));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(AppError::Config(
                "similarity_threshold must be a finite number".into(),
            ));
        }
        if self.graph_timeout_secs == 0 {
            return Err(AppError::Config(
                "graph_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Graph connection values, or a configuration error naming every missing one.
    pub fn graph_credentials(&self) -> Result<GraphCredentials, AppError> {
        let fields = [
            ("graph_location", &self.graph_location),
            ("graph_username", &self.graph_username),
            ("graph_password", &self.graph_password),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "configuration missing: {}",
                missing.join(", ")
            )));
        }

        Ok(GraphCredentials {
            location: self.graph_location.clone().unwrap_or_default(),
            username: self.graph_username.clone().unwrap_or_default(),
            password: self.graph_password.clone().unwrap_or_default(),
            database: self.graph_database.clone(),
        })
    }
}

/// Load `config.*` from the working directory layered with `KNITWORK_*` environment variables.
pub fn get_config() -> Result<AppConfig, AppError> {
    load_config(Path::new("config"))
}

pub fn load_config(path: &Path) -> Result<AppConfig, AppError> {
    let config = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(Environment::with_prefix("KNITWORK").try_parsing(true))
        .build()?;

    let config: AppConfig = config.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Text,
    Flag,
    Integer,
    Float,
}

/// Keys the `configure` command may write, with the JSON type each one takes.
const CONFIGURABLE: &[(&str, ValueKind)] = &[
    ("graph_location", ValueKind::Text),
    ("graph_username", ValueKind::Text),
    ("graph_password", ValueKind::Text),
    ("graph_database", ValueKind::Text),
    ("graph_timeout_secs", ValueKind::Integer),
    ("output_dir", ValueKind::Text),
    ("storage", ValueKind::Text),
    ("concurrency_limit", ValueKind::Integer),
    ("cached_only", ValueKind::Flag),
    ("hop_limit", ValueKind::Integer),
    ("result_limit", ValueKind::Integer),
    ("similarity_threshold", ValueKind::Float),
    ("failure_policy", ValueKind::Text),
    ("failure_warn_ratio", ValueKind::Float),
    ("terminal_subnodes", ValueKind::Flag),
    ("terminal_synthons", ValueKind::Flag),
    ("overlap_cutoff", ValueKind::Float),
    ("distance_cutoff", ValueKind::Float),
];

pub fn configurable_keys() -> impl Iterator<Item = &'static str> {
    CONFIGURABLE.iter().map(|(name, _)| *name)
}

fn coerce_value(key: &str, kind: ValueKind, raw: &str) -> Result<Value, AppError> {
    let invalid = |expected: &str| {
        AppError::Config(format!("'{key}' expects {expected}, got '{raw}'"))
    };
    match kind {
        ValueKind::Text => Ok(Value::String(raw.to_owned())),
        ValueKind::Flag => match raw {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            _ => Err(invalid("True or False")),
        },
        ValueKind::Integer => raw
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid("a non-negative integer")),
        ValueKind::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(|value| serde_json::Number::from_f64(value).map(Value::Number))
            .ok_or_else(|| invalid("a number")),
    }
}

/// Set one whitelisted key in a JSON config file, creating the file when needed.
///
/// The merged document must still deserialize and validate as an [`AppConfig`];
/// otherwise nothing is written.
pub fn update_config_file(path: &Path, key: &str, raw_value: &str) -> Result<Value, AppError> {
    let Some((_, kind)) = CONFIGURABLE.iter().find(|(name, _)| *name == key) else {
        let accepted: Vec<&str> = configurable_keys().collect();
        return Err(AppError::Config(format!(
            "'{key}' is not configurable (accepted: {})",
            accepted.join(", ")
        )));
    };
    let value = coerce_value(key, *kind, raw_value)?;

    let mut document = if path.exists() {
        let raw = std::fs::read(path)?;
        match serde_json::from_slice::<Value>(&raw)? {
            Value::Object(map) => map,
            _ => {
                return Err(AppError::Config(format!(
                    "{} does not hold a JSON object",
                    path.display()
                )))
            }
        }
    } else {
        Map::new()
    };
    document.insert(key.to_owned(), value.clone());

    let merged = Value::Object(document);
    let parsed: AppConfig = serde_json::from_value(merged.clone())
        .map_err(|err| AppError::Config(format!("rejected update of '{key}': {err}")))?;
    parsed.validate()?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(&merged)?)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config validates");
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert!(config.terminal_subnodes);
    }

    #[test]
    fn load_config_reads_json_and_rejects_unknown_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"graph_location": "http://localhost:7474", "concurrency_limit": 3, "failure_policy": "fail_fast"}"#,
        )
        .expect("write config");
        let config = load_config(&path).expect("load config");
        assert_eq!(config.graph_location.as_deref(), Some("http://localhost:7474"));
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);

        std::fs::write(&path, r#"{"KNITWORK_NUM_CONNECTIONS": 3}"#).expect("write config");
        assert!(matches!(
            load_config(&path),
            Err(AppError::ConfigSource(_))
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = AppConfig {
            concurrency_limit: 0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn missing_graph_values_are_listed() {
        let config = AppConfig {
            graph_location: Some("http://localhost:7474".into()),
            ..AppConfig::default()
        };
        let err = config.graph_credentials().expect_err("credentials missing");
        let message = err.to_string();
        assert!(message.contains("graph_username"));
        assert!(message.contains("graph_password"));
        assert!(!message.contains("graph_location"));
    }

    #[test]
    fn configure_coerces_and_persists_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        let value = update_config_file(&path, "cached_only", "True").expect("set flag");
        assert_eq!(value, Value::Bool(true));
        update_config_file(&path, "concurrency_limit", "16").expect("set integer");
        update_config_file(&path, "graph_password", "1234").expect("set text");

        let config = load_config(&path).expect("reload");
        assert!(config.cached_only);
        assert_eq!(config.concurrency_limit, 16);
        assert_eq!(config.graph_password.as_deref(), Some("1234"));
    }

    #[test]
    fn configure_rejects_unknown_keys_and_bad_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        assert!(matches!(
            update_config_file(&path, "GRAPH_SECRET", "x"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            update_config_file(&path, "hop_limit", "two"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            update_config_file(&path, "failure_policy", "sometimes"),
            Err(AppError::Config(_))
        ));
        assert!(!path.exists(), "rejected updates leave no file behind");
    }
}
