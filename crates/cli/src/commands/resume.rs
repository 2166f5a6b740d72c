//! Resume command handler.

use super::render::{cancel_on_ctrl_c, print_state, report_failure, TraceObserver};
use clap::Args;
use crag_core::config::AppConfig;
use crag_engine::build_pipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Continue an interrupted run from its last completed step
#[derive(Args, Debug)]
pub struct ResumeCommand {
    /// Run id printed when the run failed or was cancelled
    pub run_id: String,

    /// Print each completed step to stderr
    #[arg(long)]
    pub trace: bool,

    /// Output the final state as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResumeCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Resuming run {}", self.run_id);

        let mut pipeline = build_pipeline(config)?;
        if self.trace {
            pipeline = pipeline.with_observer(Arc::new(TraceObserver));
        }

        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        let result = pipeline.resume(&self.run_id, Some(cancel.clone())).await;
        cancel.cancel();

        match result {
            Ok(state) => print_state(&self.run_id, &state, self.json),
            Err(err) => {
                report_failure(config, &self.run_id, &err);
                Err(err.into())
            }
        }
    }
}
