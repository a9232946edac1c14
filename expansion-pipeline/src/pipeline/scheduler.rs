use std::sync::atomic::{AtomicUsize, Ordering};

use common::{
    error::{AppError, BackendError},
    storage::{
        cache::{CacheKey, ExpansionCache},
        types::{ExpansionResult, LookupKey},
    },
    utils::config::FailurePolicy,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::config::ExpansionConfig;
use crate::backend::{ExpansionMode, QueryBackend};

/// What became of one lookup key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// Answered from the cache or the backend; possibly empty.
    Resolved(ExpansionResult),
    /// Cache miss in a cache-only run.
    Skipped,
    Failed(BackendError),
}

/// Counters of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    pub total: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub backend_calls: usize,
    pub backend_failures: usize,
    pub skipped: usize,
}

impl ScheduleReport {
    pub fn resolved(&self) -> usize {
        self.total
            .saturating_sub(self.skipped)
            .saturating_sub(self.backend_failures)
    }

    /// Share of keys that ended in a per-key error.
    pub fn failure_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.backend_failures as f64 / self.total as f64
        }
    }

    /// Whether any key failed and the failed share is above `warn_ratio`.
    pub fn exceeds_warn_ratio(&self, warn_ratio: f64) -> bool {
        self.backend_failures > 0 && self.failure_ratio() > warn_ratio
    }

    pub fn log_summary(&self, warn_ratio: f64) {
        info!(
            total = self.total,
            cache_hits = self.cache_hits,
            cache_misses = self.cache_misses,
            backend_calls = self.backend_calls,
            backend_failures = self.backend_failures,
            skipped = self.skipped,
            "expansion scheduling finished"
        );
        if self.exceeds_warn_ratio(warn_ratio) {
            warn!(
                failure_ratio = self.failure_ratio(),
                threshold = warn_ratio,
                "a large share of expansion queries failed"
            );
        }
    }
}

#[derive(Debug)]
pub struct ScheduleOutcome {
    /// One entry per input key, in input order.
    pub outcomes: Vec<KeyOutcome>,
    pub report: ScheduleReport,
}

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    backend_calls: AtomicUsize,
    backend_failures: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) -> usize {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn into_report(self, total: usize) -> ScheduleReport {
        ScheduleReport {
            total,
            cache_hits: self.cache_hits.into_inner(),
            cache_misses: self.cache_misses.into_inner(),
            backend_calls: self.backend_calls.into_inner(),
            backend_failures: self.backend_failures.into_inner(),
            skipped: self.skipped.into_inner(),
        }
    }
}

/// Drives lookup keys through cache-then-backend with at most `concurrency_limit`
/// backend calls in flight.
pub struct Scheduler<'a> {
    cache: &'a ExpansionCache,
    backend: &'a dyn QueryBackend,
    config: &'a ExpansionConfig,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        cache: &'a ExpansionCache,
        backend: &'a dyn QueryBackend,
        config: &'a ExpansionConfig,
    ) -> Self {
        Self {
            cache,
            backend,
            config,
        }
    }

    /// Resolve every key. Per-key backend failures are recorded in the outcome unless the
    /// failure policy is fail-fast; cache storage failures abort the whole call.
    #[tracing::instrument(skip_all, fields(keys = keys.len(), mode = %mode.kind()))]
    pub async fn run(
        &self,
        keys: &[LookupKey],
        mode: &ExpansionMode,
    ) -> Result<ScheduleOutcome, AppError> {
        self.config.validate()?;
        let concurrency = self.config.concurrency_limit;
        let semaphore = Semaphore::new(concurrency);
        let counters = Counters::default();

        info!(
            total_keys = keys.len(),
            max_in_flight = concurrency,
            cached_only = self.config.cached_only,
            "starting expansion scheduling"
        );

        let semaphore = &semaphore;
        let counters_ref = &counters;
        // Completion order is arbitrary; each outcome carries its input index.
        let mut indexed: Vec<(usize, KeyOutcome)> = stream::iter(keys.iter().enumerate())
            .map(|(index, key)| async move {
                self.resolve(key, mode, semaphore, counters_ref, keys.len())
                    .await
                    .map(|outcome| (index, outcome))
            })
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;
        indexed.sort_unstable_by_key(|(index, _)| *index);
        let outcomes: Vec<KeyOutcome> = indexed.into_iter().map(|(_, outcome)| outcome).collect();

        let report = counters.into_report(keys.len());
        report.log_summary(self.config.failure_warn_ratio);
        Ok(ScheduleOutcome { outcomes, report })
    }

    async fn resolve(
        &self,
        key: &LookupKey,
        mode: &ExpansionMode,
        semaphore: &Semaphore,
        counters: &Counters,
        total: usize,
    ) -> Result<KeyOutcome, AppError> {
        let outcome = self.resolve_uncounted(key, mode, semaphore, counters).await;

        let done = Counters::bump(&counters.completed);
        if done % self.config.progress_interval.max(1) == 0 {
            info!(done, total, "expansion progress");
        }
        outcome
    }

    async fn resolve_uncounted(
        &self,
        key: &LookupKey,
        mode: &ExpansionMode,
        semaphore: &Semaphore,
        counters: &Counters,
    ) -> Result<KeyOutcome, AppError> {
        let cache_key = CacheKey::derive(
            mode.kind(),
            &key.subnode,
            &key.synthon,
            self.config.hop_limit,
            self.config.result_limit,
        );

        if let Some(hit) = self.cache.get(&cache_key).await? {
            Counters::bump(&counters.cache_hits);
            return Ok(KeyOutcome::Resolved(hit));
        }
        Counters::bump(&counters.cache_misses);

        if self.config.cached_only {
            Counters::bump(&counters.skipped);
            debug!(lookup = %key, "skipping uncached key");
            return Ok(KeyOutcome::Skipped);
        }

        let fetched = {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|err| AppError::InternalError(format!("backend permit: {err}")))?;
            self.query(key, mode, counters).await
        };

        match fetched {
            Ok(result) => {
                self.cache.put(&cache_key, &result).await?;
                Ok(KeyOutcome::Resolved(result))
            }
            Err(err) => {
                Counters::bump(&counters.backend_failures);
                warn!(lookup = %key, error = %err, "expansion query failed");
                match self.config.failure_policy {
                    FailurePolicy::Skip => Ok(KeyOutcome::Failed(err)),
                    FailurePolicy::FailFast => Err(AppError::Backend(err)),
                }
            }
        }
    }

    async fn query(
        &self,
        key: &LookupKey,
        mode: &ExpansionMode,
        counters: &Counters,
    ) -> Result<ExpansionResult, BackendError> {
        let hop_limit = self.config.hop_limit;
        let result_limit = self.config.result_limit;

        match mode {
            ExpansionMode::Pure => {
                Counters::bump(&counters.backend_calls);
                self.backend
                    .expand_pure(&key.subnode, &key.synthon, hop_limit, result_limit)
                    .await
                    .map(ExpansionResult::Pure)
            }
            ExpansionMode::Impure {
                similarity_threshold,
                fingerprints,
            } => {
                let fingerprint = fingerprints.fingerprint(&key.synthon).ok_or_else(|| {
                    BackendError::new(&key.subnode, &key.synthon, "no fingerprint for synthon")
                })?;
                Counters::bump(&counters.backend_calls);
                self.backend
                    .expand_impure(
                        &key.subnode,
                        &key.synthon,
                        hop_limit,
                        result_limit,
                        *similarity_threshold,
                        fingerprint,
                    )
                    .await
                    .map(ExpansionResult::Impure)
            }
        }
    }
}
