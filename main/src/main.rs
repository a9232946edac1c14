mod args;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use common::{
    storage::types::PairTable,
    utils::config::{get_config, load_config, update_config_file, AppConfig, CONFIG_FILE_NAME},
};
use expansion_pipeline::{
    DetachedBackend, ExpansionMode, ExpansionPipeline, ExpansionRunOutcome, FingerprintTable,
    Neo4jBackend, QueryBackend,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Cli, Command, KnitArgs, ModeArg, SubnodeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Configure { var, value } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| CONFIG_FILE_NAME.into());
            let stored = update_config_file(&path, &var, &value)
                .with_context(|| format!("updating {}", path.display()))?;
            info!(key = %var, value = %stored, file = %path.display(), "configuration updated");
            Ok(())
        }
        Command::Knit(args) => {
            let config = read_config(cli.config.as_deref())?;
            knit(config, &args).await
        }
        Command::Subnodes(args) => {
            let config = read_config(cli.config.as_deref())?;
            subnodes(&config, &args).await
        }
    }
}

fn read_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display())),
        None => get_config().context("loading configuration"),
    }
}

async fn knit(mut config: AppConfig, args: &KnitArgs) -> Result<()> {
    args.apply_to(&mut config);
    config.validate().context("validating command-line overrides")?;

    let pairs = PairTable::load(&args.pairs)
        .await
        .with_context(|| format!("reading pairs from {}", args.pairs.display()))?;
    info!(rows = pairs.len(), file = %args.pairs.display(), "loaded pairs");

    let mode = match args.mode {
        ModeArg::Pure => ExpansionMode::Pure,
        ModeArg::Impure => {
            let path = args
                .fingerprints
                .as_deref()
                .context("impure mode needs --fingerprints")?;
            let fingerprints = FingerprintTable::load(path)
                .await
                .with_context(|| format!("reading fingerprints from {}", path.display()))?;
            info!(synthons = fingerprints.len(), "loaded fingerprints");
            ExpansionMode::Impure {
                similarity_threshold: config.similarity_threshold,
                fingerprints: Arc::new(fingerprints),
            }
        }
    };

    let backend: Arc<dyn QueryBackend> = if config.cached_only && config.graph_credentials().is_err() {
        warn!("no graph configured, running from the cache alone");
        Arc::new(DetachedBackend)
    } else {
        Arc::new(Neo4jBackend::from_config(&config).context("connecting to the fragment graph")?)
    };

    let pipeline = ExpansionPipeline::new(&config, backend)
        .await
        .context("preparing the expansion pipeline")?;

    match pipeline.run(&pairs, &mode).await? {
        ExpansionRunOutcome::Empty { report } => {
            warn!(
                keys = report.total,
                failed = report.backend_failures,
                skipped = report.skipped,
                "no merges found"
            );
        }
        ExpansionRunOutcome::Completed {
            report,
            records,
            paths,
        } => {
            info!(
                merges = records.len(),
                keys = report.total,
                failed = report.backend_failures,
                json = %paths.json.display(),
                csv = %paths.csv.display(),
                "knit finished"
            );
        }
    }
    Ok(())
}

async fn subnodes(config: &AppConfig, args: &SubnodeArgs) -> Result<()> {
    let backend = Neo4jBackend::from_config(config).context("connecting to the fragment graph")?;
    let terminal_only = config.terminal_subnodes && !args.all;
    let found = backend.subnodes(&args.smiles, terminal_only).await?;
    info!(smiles = %args.smiles, terminal_only, count = found.len(), "subnodes found");
    for smiles in found {
        println!("{smiles}");
    }
    Ok(())
}
