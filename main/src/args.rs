use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use common::utils::config::{AppConfig, FailurePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[value(rename_all = "lowercase")]
pub enum ModeArg {
    #[default]
    Pure,
    Impure,
}

#[derive(Debug, Parser)]
#[command(name = "knitwork", about = "Expand fragment pairs into purchasable merges")]
pub struct Cli {
    /// Configuration file; defaults to `config.*` in the working directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand every (subnode, synthon) pair of a pairs table and write the merges
    Knit(KnitArgs),
    /// List the subnodes of a fragment
    Subnodes(SubnodeArgs),
    /// Set one configuration value in the JSON configuration file
    Configure {
        /// Configuration key
        var: String,
        /// New value; True/False and numbers are converted
        value: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct KnitArgs {
    /// JSON array of records with id_a, id_b, subnodes_A and synthons_B
    #[arg(long)]
    pub pairs: PathBuf,

    /// Directory for the cache and the merge tables
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::Pure)]
    pub mode: ModeArg,

    /// JSON object mapping synthon SMILES to pharmacophore fingerprints (impure mode)
    #[arg(long, required_if_eq("mode", "impure"))]
    pub fingerprints: Option<PathBuf>,

    /// Only use cached expansions; never query the graph
    #[arg(long)]
    pub cached_only: bool,

    /// Maximum number of graph queries in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub hop_limit: Option<u32>,

    /// Maximum tuples per query, 0 for unlimited
    #[arg(long)]
    pub result_limit: Option<u32>,

    /// Minimum fingerprint similarity for impure expansions
    #[arg(long)]
    pub similarity_threshold: Option<f64>,

    /// Abort on the first failed query instead of skipping the key
    #[arg(long)]
    pub fail_fast: bool,
}

impl KnitArgs {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.to_string_lossy().into_owned();
        }
        if self.cached_only {
            config.cached_only = true;
        }
        if let Some(value) = self.concurrency {
            config.concurrency_limit = value;
        }
        if let Some(value) = self.hop_limit {
            config.hop_limit = value;
        }
        if let Some(value) = self.result_limit {
            config.result_limit = value;
        }
        if let Some(value) = self.similarity_threshold {
            config.similarity_threshold = value;
        }
        if self.fail_fast {
            config.failure_policy = FailurePolicy::FailFast;
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SubnodeArgs {
    /// SMILES of the fragment to decompose
    pub smiles: String,

    /// Include subnodes that can be decomposed further
    #[arg(long)]
    pub all: bool,
}
