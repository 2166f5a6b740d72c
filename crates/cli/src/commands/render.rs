//! Output shared by the run commands.

use crag_core::config::AppConfig;
use crag_engine::{RunError, RunErrorKind, RunObserver, RunState, StepEvent, WebSearchDecision};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Prints a line per completed step to stderr.
pub struct TraceObserver;

impl RunObserver for TraceObserver {
    fn on_step(&self, event: &StepEvent) {
        let state = &event.state;
        let detail = match state.needs_web_search {
            Some(WebSearchDecision::Yes) if state.generation.is_none() => {
                format!("{} documents, web search needed", state.documents.len())
            }
            _ => format!("{} documents", state.documents.len()),
        };
        eprintln!(
            "[{}] {:<16} question={:?} {}",
            event.run_id,
            event.step.as_str(),
            state.question,
            detail
        );
    }
}

/// Print the final state: the answer alone, or the whole state as JSON.
pub fn print_state(run_id: &str, state: &RunState, json: bool) -> anyhow::Result<()> {
    if json {
        let output = serde_json::json!({
            "runId": run_id,
            "state": state,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", state.generation.as_deref().unwrap_or_default());
    }
    Ok(())
}

/// Describe a failed run on stderr with a hint for the likely fix.
pub fn report_failure(config: &AppConfig, run_id: &str, err: &RunError) {
    eprintln!("Error: {}", err);

    match err.kind {
        RunErrorKind::Authentication => {
            eprintln!(
                "Hint: check the credentials for provider '{}' and the {} variable",
                config.provider, config.search.api_key_env
            );
        }
        RunErrorKind::Configuration => {
            eprintln!("Hint: see .crag/config.yaml and the CRAG_* environment variables");
        }
        RunErrorKind::Component | RunErrorKind::Cancelled if err.step.is_some() => {
            eprintln!("Resume with: crag resume {}", run_id);
        }
        _ => {}
    }
}

/// Cancel the token on Ctrl-C so the run stops before its next step.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    tracing::warn!("Interrupted; stopping before the next step");
                    token.cancel();
                }
            }
            // The run finished and cancelled its own token
            _ = token.cancelled() => {}
        }
    })
}
