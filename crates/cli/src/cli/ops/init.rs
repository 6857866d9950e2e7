use clap::Args;

use bucket_ledger::state::{AppConfig, AppState, StateError};
use common::bucket::BucketConfig;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Maximum number of triples a single batch may touch
    #[arg(long)]
    pub workload_ceiling: Option<usize>,

    /// Width of a key epoch in blocks
    #[arg(long)]
    pub epoch_size: Option<u64>,

    /// Per-action limit for accounts the payment ledger has not seen
    #[arg(long)]
    pub default_limit: Option<u64>,

    /// Default log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Init {
    fn config(&self) -> AppConfig {
        let defaults = AppConfig::default();
        AppConfig {
            bucket: BucketConfig {
                workload_ceiling: self
                    .workload_ceiling
                    .unwrap_or(defaults.bucket.workload_ceiling),
                epoch_size: self.epoch_size.unwrap_or(defaults.bucket.epoch_size),
                ..defaults.bucket
            },
            default_limit: self.default_limit.unwrap_or(defaults.default_limit),
            log_level: self.log_level.clone().unwrap_or(defaults.log_level),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), Some(self.config()))?;
        let account = state.account()?;

        let output = format!(
            "Initialized bucket-ledger directory at: {}\n\
             - Key: {}\n\
             - Config: {}\n\
             - Account: {}\n\
             - Workload ceiling: {}\n\
             - Epoch size: {}\n\
             - Default limit: {}",
            state.state_dir.display(),
            state.key_path.display(),
            state.config_path.display(),
            account,
            state.config.bucket.workload_ceiling,
            state.config.bucket.epoch_size,
            state.config.default_limit,
        );

        Ok(output)
    }
}
