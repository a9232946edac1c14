use common::{
    error::AppError,
    utils::config::{AppConfig, FailurePolicy},
};

#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    pub concurrency_limit: usize,
    pub cached_only: bool,
    pub hop_limit: u32,
    /// 0 means unlimited.
    pub result_limit: u32,
    pub failure_policy: FailurePolicy,
    pub failure_warn_ratio: f64,
    /// Keys between two progress lines.
    pub progress_interval: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            cached_only: false,
            hop_limit: 2,
            result_limit: 0,
            failure_policy: FailurePolicy::Skip,
            failure_warn_ratio: 0.5,
            progress_interval: 500,
        }
    }
}

impl ExpansionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit,
            cached_only: config.cached_only,
            hop_limit: config.hop_limit,
            result_limit: config.result_limit,
            failure_policy: config.failure_policy,
            failure_warn_ratio: config.failure_warn_ratio,
            ..Self::default()
        }
    }

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
        Ok(())
    }
}
