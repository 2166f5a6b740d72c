//! Pipeline orchestrator.
//!
//! Drives one [`RunState`] through the fixed topology in [`crate::step`].
//! Every step runs exactly once along the chosen branch. The orchestrator
//! never retries a step and never switches branch on failure: the first
//! error ends the run and is returned as a [`RunError`] naming the step.

use crate::checkpoint::{CheckpointError, Checkpointer, RunCheckpoint};
use crate::components::{Generator, Grade, Grader, Retriever, Rewriter, SearchHit, WebSearch};
use crate::error::{RunError, RunErrorKind};
use crate::events::{RunObserver, StepEvent};
use crate::settings::PipelineSettings;
use crate::state::{Document, RunState};
use crate::step::{decide_to_generate, filter_relevant, Step};
use crag_core::{AppError, AppResult};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Source label carried by the document built from web search results.
pub const WEB_SEARCH_SOURCE: &str = "web_search";

/// The five capabilities a pipeline is built from.
#[derive(Clone)]
pub struct Components {
    pub retriever: Arc<dyn Retriever>,
    pub grader: Arc<dyn Grader>,
    pub rewriter: Arc<dyn Rewriter>,
    pub web_search: Arc<dyn WebSearch>,
    pub generator: Arc<dyn Generator>,
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run id used for checkpoints and logs; generated when absent
    pub run_id: Option<String>,

    /// Checked before each step
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A CRAG pipeline. Holds no per-run state, so one instance can serve
/// many concurrent runs.
pub struct Pipeline {
    components: Components,
    settings: PipelineSettings,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    observer: Option<Arc<dyn RunObserver>>,
}

impl Pipeline {
    pub fn new(components: Components, settings: PipelineSettings) -> Self {
        Self {
            components,
            settings,
            checkpointer: None,
            observer: None,
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    /// Answer a question with a fresh run.
    pub async fn run(&self, question: &str) -> Result<RunState, RunError> {
        self.run_with_options(question, RunOptions::default()).await
    }

    pub async fn run_with_options(
        &self,
        question: &str,
        options: RunOptions,
    ) -> Result<RunState, RunError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RunError::configuration("question must not be empty"));
        }

        let run_id = options
            .run_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.check_run_id(&run_id)?;
        let span = info_span!("crag_run", run_id = %run_id);

        self.drive(&run_id, RunState::new(question), Step::FIRST, options.cancel)
            .instrument(span)
            .await
    }

    /// Continue a checkpointed run with the step after the last completed
    /// one. Completed steps are never executed again.
    pub async fn resume(
        &self,
        run_id: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<RunState, RunError> {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or_else(|| RunError::configuration("resuming a run requires a checkpointer"))?;
        self.check_run_id(run_id)?;

        let record = checkpointer
            .get(run_id)
            .await
            .map_err(|e| RunError::checkpoint(None, e))?
            .ok_or_else(|| {
                RunError::checkpoint(None, CheckpointError::NotFound(run_id.to_string()))
            })?;

        let span = info_span!("crag_run", run_id = %run_id);
        let last = record.last_completed_step;

        match last.next(record.state.needs_web_search) {
            Some(next) => {
                info!(parent: &span, "Resuming after step {}", last);
                self.drive(run_id, record.state, next, cancel)
                    .instrument(span)
                    .await
            }
            None if record.state.is_complete() => {
                self.forget(run_id).await?;
                Ok(record.state)
            }
            None => Err(RunError::checkpoint(
                Some(last),
                CheckpointError::Serialization(format!(
                    "checkpoint for run {} has no step to resume",
                    run_id
                )),
            )),
        }
    }

    /// A run id the checkpointer would refuse is a configuration error,
    /// reported before any step runs.
    fn check_run_id(&self, run_id: &str) -> Result<(), RunError> {
        if let Some(ref checkpointer) = self.checkpointer {
            checkpointer
                .validate_id(run_id)
                .map_err(|e| RunError::configuration(e.to_string()))?;
        }
        Ok(())
    }

    async fn drive(
        &self,
        run_id: &str,
        mut state: RunState,
        first: Step,
        cancel: Option<CancellationToken>,
    ) -> Result<RunState, RunError> {
        let started = Instant::now();
        let mut next = Some(first);

        while let Some(step) = next {
            if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                warn!("Run cancelled before step {}", step);
                return Err(RunError::cancelled(step, "run cancelled by caller"));
            }
            if let Some(limit) = self.settings.run_timeout {
                if started.elapsed() >= limit {
                    warn!("Run timed out before step {}", step);
                    return Err(RunError::cancelled(
                        step,
                        format!("run exceeded its {}s timeout", limit.as_secs_f64()),
                    ));
                }
            }

            debug!(step = %step, "Running step");
            state = self.execute(step, state).await.map_err(|e| {
                warn!(step = %step, "Step failed: {}", e);
                RunError::from_component(step, e)
            })?;

            if let Some(ref checkpointer) = self.checkpointer {
                checkpointer
                    .put(&RunCheckpoint::new(run_id, state.clone(), step))
                    .await
                    .map_err(|e| RunError::checkpoint(Some(step), e))?;
            }

            if let Some(ref observer) = self.observer {
                observer.on_step(&StepEvent {
                    run_id: run_id.to_string(),
                    step,
                    state: state.clone(),
                });
            }

            next = step.next(state.needs_web_search);
        }

        if !state.is_complete() {
            return Err(RunError {
                step: None,
                kind: RunErrorKind::Component,
                message: "run ended without a generation".to_string(),
            });
        }

        self.forget(run_id).await?;

        info!(
            "Run finished in {:.2}s with {} documents",
            started.elapsed().as_secs_f64(),
            state.documents.len()
        );
        Ok(state)
    }

    /// Drop the checkpoint of a finished run.
    async fn forget(&self, run_id: &str) -> Result<(), RunError> {
        if let Some(ref checkpointer) = self.checkpointer {
            checkpointer
                .delete(run_id)
                .await
                .map_err(|e| RunError::checkpoint(Some(Step::Generate), e))?;
        }
        Ok(())
    }

    async fn execute(&self, step: Step, state: RunState) -> AppResult<RunState> {
        match step {
            Step::Retrieve => self.retrieve(state).await,
            Step::GradeDocuments => self.grade_documents(state).await,
            Step::TransformQuery => self.transform_query(state).await,
            Step::WebSearch => self.web_search(state).await,
            Step::Generate => self.generate(state).await,
        }
    }

    /// Replace the documents with a fresh retrieval.
    async fn retrieve(&self, state: RunState) -> AppResult<RunState> {
        let documents = self.components.retriever.retrieve(&state.question).await?;
        info!("Retrieved {} documents", documents.len());
        Ok(RunState { documents, ..state })
    }

    /// Grade every document, keep the relevant ones and record the decision.
    async fn grade_documents(&self, state: RunState) -> AppResult<RunState> {
        // Owned futures keep the run future Send for tokio::spawn
        let calls: Vec<_> = state
            .documents
            .iter()
            .map(|doc| {
                let grader = Arc::clone(&self.components.grader);
                let question = state.question.clone();
                let content = doc.content.clone();
                async move { grader.grade(&question, &content).await }
            })
            .collect();

        let grades: Vec<Grade> = stream::iter(calls)
            .buffered(self.settings.grade_concurrency.max(1))
            .try_collect()
            .await?;

        for (i, grade) in grades.iter().enumerate() {
            debug!(
                "Document {}: {}",
                i,
                if grade.relevant { "relevant" } else { "not relevant" }
            );
        }

        let (documents, decision) = filter_relevant(state.documents, &grades);
        info!(
            "Kept {} of {} documents; next: {}",
            documents.len(),
            grades.len(),
            decide_to_generate(decision).as_str()
        );

        Ok(RunState {
            documents,
            needs_web_search: Some(decision),
            ..state
        })
    }

    /// Replace the question with one tuned for web search.
    async fn transform_query(&self, state: RunState) -> AppResult<RunState> {
        let rewritten = self.components.rewriter.rewrite(&state.question).await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Err(AppError::Llm(
                "question rewriter returned empty text".to_string(),
            ));
        }

        info!("Rewrote question: {}", rewritten);
        Ok(RunState {
            question: rewritten.to_string(),
            ..state
        })
    }

    /// Append one document built from the search results.
    async fn web_search(&self, state: RunState) -> AppResult<RunState> {
        let hits = self.components.web_search.search(&state.question).await?;
        info!("Web search returned {} results", hits.len());

        let mut documents = state.documents;
        documents.push(web_document(&state.question, &hits));
        Ok(RunState { documents, ..state })
    }

    async fn generate(&self, state: RunState) -> AppResult<RunState> {
        let generation = self
            .components
            .generator
            .generate(&state.question, &state.documents)
            .await?;
        Ok(RunState {
            generation: Some(generation),
            ..state
        })
    }
}

/// Join the result contents into a single document. Zero results still give
/// one (empty) document.
fn web_document(query: &str, hits: &[SearchHit]) -> Document {
    let content = hits
        .iter()
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let urls: Vec<&str> = hits.iter().filter_map(|h| h.url.as_deref()).collect();

    Document::new(content).with_metadata(serde_json::json!({
        "source": WEB_SEARCH_SOURCE,
        "query": query,
        "urls": urls,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_document_joins_contents() {
        let hits = vec![
            SearchHit {
                content: "first".to_string(),
                url: Some("https://a.example".to_string()),
                title: None,
            },
            SearchHit::new("second"),
        ];
        let doc = web_document("q", &hits);
        assert_eq!(doc.content, "first\nsecond");
        assert_eq!(doc.metadata["source"], WEB_SEARCH_SOURCE);
        assert_eq!(doc.metadata["urls"][0], "https://a.example");
    }

    #[test]
    fn test_web_document_without_hits_is_empty() {
        let doc = web_document("q", &[]);
        assert!(doc.content.is_empty());
        assert_eq!(doc.metadata["source"], WEB_SEARCH_SOURCE);
    }

    #[test]
    fn test_web_document_keeps_blank_results() {
        let hits = vec![SearchHit::new("first"), SearchHit::new(""), SearchHit::new("third")];
        assert_eq!(web_document("q", &hits).content, "first\n\nthird");
    }
}
