//! Structured failures returned to the caller of a run.

use crate::checkpoint::CheckpointError;
use crate::step::Step;
use crag_core::AppError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    /// Invalid configuration or input; raised before any step runs
    Configuration,
    /// A component raised or returned malformed output
    Component,
    /// A provider rejected its credentials
    Authentication,
    /// The caller cancelled the run or its deadline passed
    Cancelled,
    /// Run state could not be saved or loaded
    Checkpoint,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunErrorKind::Configuration => "configuration",
            RunErrorKind::Component => "component",
            RunErrorKind::Authentication => "authentication",
            RunErrorKind::Cancelled => "cancelled",
            RunErrorKind::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

/// A failed run: which step, what kind of failure, and the detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    /// The step that failed or was about to run; absent before the first step
    pub step: Option<Step>,
    pub kind: RunErrorKind,
    pub message: String,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "{} failure in step '{}': {}", self.kind, step, self.message),
            None => write!(f, "{} failure: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RunError {}

impl RunError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            step: None,
            kind: RunErrorKind::Configuration,
            message: message.into(),
        }
    }

    pub fn cancelled(step: Step, message: impl Into<String>) -> Self {
        Self {
            step: Some(step),
            kind: RunErrorKind::Cancelled,
            message: message.into(),
        }
    }

    pub fn checkpoint(step: Option<Step>, err: CheckpointError) -> Self {
        Self {
            step,
            kind: RunErrorKind::Checkpoint,
            message: err.to_string(),
        }
    }

    /// Classify an error raised by the component behind `step`.
    pub fn from_component(step: Step, err: AppError) -> Self {
        let kind = match err {
            AppError::Auth { .. } => RunErrorKind::Authentication,
            AppError::Config(_) => RunErrorKind::Configuration,
            AppError::Cancelled(_) => RunErrorKind::Cancelled,
            _ => RunErrorKind::Component,
        };
        Self {
            step: Some(step),
            kind,
            message: err.to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind == RunErrorKind::Authentication
    }
}

impl From<AppError> for RunError {
    /// Errors raised outside any step are configuration problems.
    fn from(err: AppError) -> Self {
        match err {
            AppError::Auth { .. } => Self {
                step: None,
                kind: RunErrorKind::Authentication,
                message: err.to_string(),
            },
            other => Self::configuration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_classification() {
        let err = RunError::from_component(Step::WebSearch, AppError::auth("tavily", "401"));
        assert!(err.is_auth());
        assert_eq!(err.step, Some(Step::WebSearch));

        let err = RunError::from_component(
            Step::GradeDocuments,
            AppError::Llm("malformed grade".to_string()),
        );
        assert_eq!(err.kind, RunErrorKind::Component);
        assert!(err.to_string().contains("grade_documents"));
        assert!(err.to_string().contains("malformed grade"));
    }

    #[test]
    fn test_configuration_error_has_no_step() {
        let err: RunError = AppError::Config("missing key".to_string()).into();
        assert_eq!(err.kind, RunErrorKind::Configuration);
        assert!(err.step.is_none());
        assert_eq!(err.to_string(), "configuration failure: Configuration error: missing key");
    }

    #[test]
    fn test_serializes_for_json_output() {
        let err = RunError::cancelled(Step::Generate, "deadline passed");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["step"], "generate");
        assert_eq!(json["kind"], "cancelled");
    }
}
