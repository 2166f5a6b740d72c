//! Ask command handler.
//!
//! Answers questions through the corrective RAG pipeline, either a single
//! question from the command line or an interactive loop over stdin.

use super::render::{cancel_on_ctrl_c, print_state, report_failure, TraceObserver};
use anyhow::Context;
use clap::Args;
use crag_core::config::AppConfig;
use crag_engine::{build_pipeline, Pipeline, RunOptions};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// Ask a question (reads questions from stdin when none is given)
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to answer
    pub question: Option<String>,

    /// Knowledge base to retrieve from (overrides pipeline.knowledgeBase)
    #[arg(short, long)]
    pub knowledge_base: Option<String>,

    /// Documents retrieved per question
    #[arg(short = 'k', long)]
    pub top_k: Option<u32>,

    /// Run id for checkpoints (generated when absent)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Abandon the run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print each completed step to stderr
    #[arg(long)]
    pub trace: bool,

    /// Output the final state as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if let Some(ref base) = self.knowledge_base {
            config.pipeline.knowledge_base = base.clone();
        }
        if let Some(top_k) = self.top_k {
            config.pipeline.top_k = top_k;
        }
        if let Some(timeout) = self.timeout {
            config.pipeline.timeout_secs = Some(timeout);
        }

        let mut pipeline = match build_pipeline(&config) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                report_failure(&config, "", &err);
                return Err(err.into());
            }
        };
        if self.trace {
            pipeline = pipeline.with_observer(Arc::new(TraceObserver));
        }

        match self.question {
            Some(ref question) => {
                let run_id = self
                    .run_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                self.answer(&config, &pipeline, question, &run_id).await
            }
            None => {
                let stdin = BufReader::new(tokio::io::stdin());
                self.interactive(&config, &pipeline, stdin).await
            }
        }
    }

    async fn answer(
        &self,
        config: &AppConfig,
        pipeline: &Pipeline,
        question: &str,
        run_id: &str,
    ) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        let options = RunOptions::default()
            .with_run_id(run_id)
            .with_cancel(cancel.clone());
        let result = pipeline.run_with_options(question, options).await;
        cancel.cancel();

        match result {
            Ok(state) => print_state(run_id, &state, self.json),
            Err(err) => {
                report_failure(config, run_id, &err);
                Err(err.into())
            }
        }
    }

    /// Read questions until EOF or an exit word. Each question is a fresh run;
    /// a failed run is reported and the loop continues.
    async fn interactive<R>(
        &self,
        config: &AppConfig,
        pipeline: &Pipeline,
        input: R,
    ) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        loop {
            eprint!("Question: ");
            std::io::stderr().flush().ok();

            let Some(line) = lines
                .next_line()
                .await
                .context("Failed to read from stdin")?
            else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
                break;
            }

            let run_id = uuid::Uuid::new_v4().to_string();
            if let Err(e) = self.answer(config, pipeline, question, &run_id).await {
                tracing::debug!("Run {} failed: {}", run_id, e);
            }
        }

        eprintln!("Goodbye!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crag_core::{AppError, AppResult};
    use crag_engine::{
        Components, Document, Generator, Grade, Grader, PipelineSettings, Retriever, Rewriter,
        SearchHit, WebSearch,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts questions reaching the pipeline and fails each run at Retrieve.
    #[derive(Default)]
    struct CountingRetriever {
        questions: AtomicUsize,
    }

    #[async_trait]
    impl Retriever for CountingRetriever {
        async fn retrieve(&self, _question: &str) -> AppResult<Vec<Document>> {
            self.questions.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Knowledge("no index".to_string()))
        }
    }

    struct Unused;

    #[async_trait]
    impl Grader for Unused {
        async fn grade(&self, _question: &str, _document: &str) -> AppResult<Grade> {
            Ok(Grade { relevant: true })
        }
    }

    #[async_trait]
    impl Rewriter for Unused {
        async fn rewrite(&self, question: &str) -> AppResult<String> {
            Ok(question.to_string())
        }
    }

    #[async_trait]
    impl WebSearch for Unused {
        async fn search(&self, _query: &str) -> AppResult<Vec<SearchHit>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl Generator for Unused {
        async fn generate(&self, _question: &str, _documents: &[Document]) -> AppResult<String> {
            Ok(String::new())
        }
    }

    fn pipeline(retriever: Arc<CountingRetriever>) -> Pipeline {
        let unused = Arc::new(Unused);
        Pipeline::new(
            Components {
                retriever,
                grader: unused.clone(),
                rewriter: unused.clone(),
                web_search: unused.clone(),
                generator: unused,
            },
            PipelineSettings::default(),
        )
    }

    fn command() -> AskCommand {
        AskCommand {
            question: None,
            knowledge_base: None,
            top_k: None,
            run_id: None,
            timeout: None,
            trace: false,
            json: false,
        }
    }

    #[tokio::test]
    async fn test_interactive_stops_at_exit_word() {
        let retriever = Arc::new(CountingRetriever::default());
        let pipeline = pipeline(retriever.clone());
        let input: &[u8] = b"\n   \nwhat is an agent?\nQuit\nnever asked\n";

        command()
            .interactive(&AppConfig::default(), &pipeline, input)
            .await
            .unwrap();

        assert_eq!(retriever.questions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interactive_continues_after_failed_runs_until_eof() {
        let retriever = Arc::new(CountingRetriever::default());
        let pipeline = pipeline(retriever.clone());
        let input: &[u8] = b"first\nsecond";

        command()
            .interactive(&AppConfig::default(), &pipeline, input)
            .await
            .unwrap();

        assert_eq!(retriever.questions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exit_words() {
        for word in ["exit", "QUIT", "q"] {
            assert!(EXIT_WORDS.contains(&word.to_lowercase().as_str()));
        }
        assert!(!EXIT_WORDS.contains(&"question"));
    }
}
