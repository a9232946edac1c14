mod config;
mod scheduler;


pub use config::ExpansionConfig;
pub use scheduler::{KeyOutcome, ScheduleOutcome, ScheduleReport, Scheduler};

use std::{sync::Arc, time::Instant};

use common::{
    error::AppError,
    storage::{
        cache::ExpansionCache,
        store::{resolve_output_dir, StorageManager},
        types::PairTable,
    },
    utils::config::AppConfig,
};
use tracing::info;

use crate::{
    aggregate::{aggregate, Aggregation, MergeRecord},
    backend::{ExpansionMode, QueryBackend},
    keys::derive_lookup_keys,
    sink::{MergeSink, SinkPaths},
};

/// Result of one end-to-end run.
#[derive(Debug)]
pub enum ExpansionRunOutcome {
    /// No key produced a merge; nothing was written.
    Empty { report: ScheduleReport },
    Completed {
        report: ScheduleReport,
        records: Vec<MergeRecord>,
        paths: SinkPaths,
    },
}

impl ExpansionRunOutcome {
    pub fn report(&self) -> &ScheduleReport {
        match self {
            ExpansionRunOutcome::Empty { report } | ExpansionRunOutcome::Completed { report, .. } => {
                report
            }
        }
    }
}

/// Pairs table in, merge files out: key derivation, scheduling, aggregation and persistence.
#[allow(clippy::module_name_repetitions)]
pub struct ExpansionPipeline {
    cache: ExpansionCache,
    backend: Arc<dyn QueryBackend>,
    config: ExpansionConfig,
    sink: MergeSink,
}

impl ExpansionPipeline {
    /// Cache and output locations come from `config`.
    pub async fn new(config: &AppConfig, backend: Arc<dyn QueryBackend>) -> Result<Self, AppError> {
        let storage = StorageManager::new(config).await?;
        let pipeline_config = ExpansionConfig::from_app_config(config);
        pipeline_config.validate()?;

        Ok(Self::with_parts(
            ExpansionCache::new(storage),
            backend,
            pipeline_config,
            MergeSink::new(resolve_output_dir(config)),
        ))
    }

    pub fn with_parts(
        cache: ExpansionCache,
        backend: Arc<dyn QueryBackend>,
        config: ExpansionConfig,
        sink: MergeSink,
    ) -> Self {
        Self {
            cache,
            backend,
            config,
            sink,
        }
    }

    pub fn cache(&self) -> &ExpansionCache {
        &self.cache
    }

    #[tracing::instrument(
        skip_all,
        fields(pairs = pairs.len(), mode = %mode.kind(), cached_only = self.config.cached_only)
    )]
    pub async fn run(
        &self,
        pairs: &PairTable,
        mode: &ExpansionMode,
    ) -> Result<ExpansionRunOutcome, AppError> {
        let started = Instant::now();

        let keys = derive_lookup_keys(pairs);
        info!(unique_keys = keys.len(), "derived lookup keys");

        let scheduler = Scheduler::new(&self.cache, self.backend.as_ref(), &self.config);
        let ScheduleOutcome { outcomes, report } = scheduler.run(&keys, mode).await?;

        let outcome = match aggregate(mode.kind(), &keys, &outcomes)? {
            Aggregation::Empty => {
                info!("no merges found, nothing written");
                ExpansionRunOutcome::Empty { report }
            }
            Aggregation::Merges(table) => {
                let paths = self.sink.write(&table).await?;
                ExpansionRunOutcome::Completed {
                    report,
                    records: table.into_records(),
                    paths,
                }
            }
        };

        info!(
            elapsed_ms = started.elapsed().as_millis(),
            "expansion run finished"
        );
        Ok(outcome)
    }
}
