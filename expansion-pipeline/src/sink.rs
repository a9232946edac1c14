use std::path::{Path, PathBuf};

use common::{error::AppError, storage::types::ExpansionKind};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{MergeRecord, MergeTable};

/// Separator of the identifier list in the flat table.
pub const SOURCE_ID_SEPARATOR: &str = ";";

const PURE_COLUMNS: [&str; 7] = [
    "ID",
    "pair_id_a",
    "pair_id_b",
    "subnode",
    "synthon",
    "merge_string",
    "source_ids",
];
const IMPURE_COLUMNS: [&str; 2] = ["source_synthon", "similarity_score"];

#[derive(Serialize)]
struct NumberedRecord<'a> {
    #[serde(rename = "ID")]
    id: usize,
    #[serde(flatten)]
    record: &'a MergeRecord,
}

/// Where one run's merges were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Writes a merge table as `{mode}_merges.json` and `{mode}_merges.csv`.
///
/// Both files carry the same sequential `ID` column. They are staged next to their
/// final names and renamed only once both are fully written. The two renames are
/// separate steps: if the second fails, the first file is already in place and the
/// staged files are removed.
#[derive(Debug, Clone)]
pub struct MergeSink {
    output_dir: PathBuf,
}

impl MergeSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn paths_for(&self, kind: ExpansionKind) -> SinkPaths {
        SinkPaths {
            json: self.output_dir.join(format!("{kind}_merges.json")),
            csv: self.output_dir.join(format!("{kind}_merges.csv")),
        }
    }

    pub async fn write(&self, table: &MergeTable) -> Result<SinkPaths, AppError> {
        if table.is_empty() {
            return Err(AppError::InternalError(
                "refusing to write an empty merge table".into(),
            ));
        }

        let json = render_json(table)?;
        let csv = render_csv(table)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let paths = self.paths_for(table.kind());
        let staged_json = staging_path(&paths.json);
        let staged_csv = staging_path(&paths.csv);

        let published: std::io::Result<()> = async {
            tokio::fs::write(&staged_json, json).await?;
            tokio::fs::write(&staged_csv, csv).await?;
            tokio::fs::rename(&staged_json, &paths.json).await?;
            tokio::fs::rename(&staged_csv, &paths.csv).await
        }
        .await;
        if let Err(err) = published {
            discard_staged(&[staged_json.as_path(), staged_csv.as_path()]).await;
            return Err(err.into());
        }

        info!(
            records = table.len(),
            json = %paths.json.display(),
            csv = %paths.csv.display(),
            "wrote merge table"
        );
        Ok(paths)
    }
}

async fn discard_staged(paths: &[&Path]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "could not remove staged file"),
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

fn render_json(table: &MergeTable) -> Result<Vec<u8>, AppError> {
    let numbered: Vec<NumberedRecord<'_>> = table
        .records()
        .iter()
        .enumerate()
        .map(|(id, record)| NumberedRecord { id, record })
        .collect();
    Ok(serde_json::to_vec_pretty(&numbered)?)
}

fn render_csv(table: &MergeTable) -> Result<Vec<u8>, AppError> {
    let impure = table.kind() == ExpansionKind::Impure;
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = PURE_COLUMNS.to_vec();
    if impure {
        header.extend(IMPURE_COLUMNS);
    }
    writer.write_record(&header)?;

    for (id, record) in table.records().iter().enumerate() {
        let mut row = vec![
            id.to_string(),
            record.pair_id_a().to_owned(),
            record.pair_id_b().to_owned(),
            record.subnode().to_owned(),
            record.synthon().to_owned(),
            record.merge_string().to_owned(),
            record.source_ids().join(SOURCE_ID_SEPARATOR),
        ];
        if impure {
            row.push(record.source_synthon().unwrap_or_default().to_owned());
            row.push(
                record
                    .similarity_score()
                    .map(|score| score.to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|err| AppError::Io(err.into_error()))
}
