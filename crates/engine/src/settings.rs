//! Explicit run configuration for the orchestrator.

use crag_core::config::PipelineConfig;
use std::time::Duration;

/// Settings fixed when the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Grader calls allowed in flight at once (at least 1)
    pub grade_concurrency: usize,

    /// Runs that take longer are abandoned at the next step boundary
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            grade_concurrency: 1,
            run_timeout: None,
        }
    }
}

impl PipelineSettings {
    pub fn with_grade_concurrency(mut self, concurrency: usize) -> Self {
        self.grade_concurrency = concurrency.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            grade_concurrency: config.grade_concurrency.max(1),
            run_timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pipeline_config() {
        let config = PipelineConfig {
            grade_concurrency: 0,
            timeout_secs: Some(30),
            ..Default::default()
        };
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.grade_concurrency, 1);
        assert_eq!(settings.run_timeout, Some(Duration::from_secs(30)));
    }
}
