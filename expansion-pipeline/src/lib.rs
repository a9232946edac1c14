#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod aggregate;
pub mod backend;
pub mod fingerprints;
pub mod keys;
pub mod pipeline;
pub mod sink;

pub use aggregate::{Aggregation, MergeRecord, MergeTable};
pub use backend::{DetachedBackend, ExpansionMode, Neo4jBackend, QueryBackend};
pub use fingerprints::{FingerprintProvider, FingerprintTable};
pub use keys::derive_lookup_keys;
pub use pipeline::{
    ExpansionConfig, ExpansionPipeline, ExpansionRunOutcome, KeyOutcome, ScheduleReport,
};
pub use sink::{MergeSink, SinkPaths};
