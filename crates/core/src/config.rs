//! Configuration management for CRAG.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Defaults
//! - Config files (.crag/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with most state stored in `.crag/`.
//! Credentials are never read during a run: they are resolved here once and
//! handed to the components that need them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .crag/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider ("openai" or "ollama")
    pub provider: String,

    /// Default model identifier
    pub model: String,

    /// Explicit API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Web search settings
    pub search: SearchConfig,

    /// Pipeline run settings
    pub pipeline: PipelineConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(rename = "activeEmbeddingProvider", default = "default_embedding_provider")]
    pub active_embedding_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

fn default_embedding_provider() -> String {
    "trigram".to_string()
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        #[serde(rename = "organizationEnv")]
        organization_env: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Custom endpoint, if one is configured.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Web search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search provider ("tavily")
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Environment variable holding the search API key
    #[serde(rename = "apiKeyEnv", default = "default_search_key_env")]
    pub api_key_env: String,

    /// Number of results requested per query
    #[serde(rename = "maxResults", default = "default_max_results")]
    pub max_results: u32,

    /// Retries for transient failures before the error surfaces
    #[serde(rename = "maxRetries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Custom endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_search_provider() -> String {
    "tavily".to_string()
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_max_results() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
            max_retries: default_max_retries(),
            endpoint: None,
        }
    }
}

/// Pipeline run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Knowledge base queried by the retriever
    #[serde(rename = "knowledgeBase", default = "default_knowledge_base")]
    pub knowledge_base: String,

    /// Documents retrieved per question
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: u32,

    /// Grader calls allowed in flight at once
    #[serde(rename = "gradeConcurrency", default = "default_grade_concurrency")]
    pub grade_concurrency: usize,

    /// Directory for run checkpoints (defaults to .crag/runs)
    #[serde(rename = "checkpointDir", default)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Abandon a run once this many seconds have elapsed between steps
    #[serde(rename = "timeoutSecs", default)]
    pub timeout_secs: Option<u64>,
}

fn default_knowledge_base() -> String {
    "default".to_string()
}

fn default_top_k() -> u32 {
    4
}

fn default_grade_concurrency() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            knowledge_base: default_knowledge_base(),
            top_k: default_top_k(),
            grade_concurrency: default_grade_concurrency(),
            checkpoint_dir: None,
            timeout_secs: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    search: Option<SearchConfig>,
    pipeline: Option<PipelineConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: None,
            search: SearchConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML config file and environment variables.
    ///
    /// Environment variables:
    /// - `CRAG_WORKSPACE`: Override workspace path
    /// - `CRAG_CONFIG`: Path to config file
    /// - `CRAG_PROVIDER`: LLM provider
    /// - `CRAG_MODEL`: Model identifier
    /// - `CRAG_API_KEY`: LLM API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use crag_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("CRAG_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("CRAG_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace.join(".crag/config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("CRAG_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("CRAG_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("CRAG_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok().or(config.log_level);

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            result.llm = Some(llm);
        }

        if let Some(search) = config_file.search {
            result.search = search;
        }

        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .crag directory.
    pub fn crag_dir(&self) -> PathBuf {
        self.workspace.join(".crag")
    }

    /// Ensure the .crag directory exists.
    pub fn ensure_crag_dir(&self) -> AppResult<()> {
        let crag_dir = self.crag_dir();
        if !crag_dir.exists() {
            std::fs::create_dir_all(&crag_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .crag directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Directory holding run checkpoints.
    pub fn checkpoint_dir(&self) -> PathBuf {
        match self.pipeline.checkpoint_dir {
            Some(ref dir) if dir.is_absolute() => dir.clone(),
            Some(ref dir) => self.workspace.join(dir),
            None => self.crag_dir().join("runs"),
        }
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Endpoint for the active provider, if configured.
    pub fn provider_endpoint(&self) -> Option<String> {
        self.get_provider_config(&self.provider)
            .and_then(|pc| pc.endpoint().map(str::to_string))
    }

    /// Resolve the LLM API key for a provider.
    ///
    /// `CRAG_API_KEY` wins; otherwise the provider's `apiKeyEnv` is consulted,
    /// falling back to `OPENAI_API_KEY` for the openai provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        let env_var = match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => Some(api_key_env),
            Some(ProviderConfig::Ollama { .. }) => None,
            None if provider.eq_ignore_ascii_case("openai") => {
                Some("OPENAI_API_KEY".to_string())
            }
            None => None,
        };

        env_var.and_then(|var| std::env::var(var).ok())
    }

    /// Resolve the web search API key.
    pub fn resolve_search_key(&self) -> Option<String> {
        std::env::var(&self.search.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Validate configuration before any pipeline step runs.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.to_lowercase();
        let known_providers = ["openai", "ollama"];

        if !known_providers.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if provider == "openai" && self.resolve_api_key(&provider).is_none() {
            let env_var = match self.get_provider_config(&provider) {
                Some(ProviderConfig::OpenAI { api_key_env, .. }) => api_key_env,
                _ => "OPENAI_API_KEY".to_string(),
            };
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                env_var
            )));
        }

        if self.search.provider != "tavily" {
            return Err(AppError::Config(format!(
                "Unknown search provider: {}. Supported: tavily",
                self.search.provider
            )));
        }

        if self.resolve_search_key().is_none() {
            return Err(AppError::Config(format!(
                "Search API key not found in environment variable: {}",
                self.search.api_key_env
            )));
        }

        if self.pipeline.top_k == 0 {
            return Err(AppError::Config("pipeline.topK must be at least 1".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.pipeline.top_k, 4);
        assert!(!config.verbose);
        assert!(!config.no_color);
    }

    #[test]
    fn test_crag_dir_and_checkpoint_dir() {
        let config = AppConfig::default();
        assert!(config.crag_dir().ends_with(".crag"));
        assert!(config.checkpoint_dir().ends_with(".crag/runs"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("openai".to_string()),
            Some("gpt-4o-mini".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4o-mini");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_missing_search_key() {
        let mut config = AppConfig::default();
        config.search.api_key_env = "CRAG_TEST_SEARCH_KEY_THAT_IS_NEVER_SET".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CRAG_TEST_SEARCH_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_validate_openai_without_key() {
        let mut config = AppConfig::default();
        config.provider = "openai".to_string();
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig::OpenAI {
                api_key_env: "CRAG_TEST_OPENAI_KEY_THAT_IS_NEVER_SET".to_string(),
                model: "gpt-4o-mini".to_string(),
                endpoint: None,
                organization_env: None,
            },
        );
        config.llm = Some(LlmConfig {
            active_provider: "openai".to_string(),
            active_embedding_provider: "trigram".to_string(),
            providers,
        });

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CRAG_TEST_OPENAI_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-explicit".to_string());
        assert_eq!(
            config.resolve_api_key("openai"),
            Some("sk-explicit".to_string())
        );
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: qwen2.5
search:
  maxResults: 5
pipeline:
  knowledgeBase: papers
  topK: 6
  gradeConcurrency: 4
logging:
  level: warn
  color: false
"#,
        )
        .unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(merged.provider, "ollama");
        assert_eq!(merged.model, "qwen2.5");
        assert_eq!(merged.provider_endpoint().as_deref(), Some("http://localhost:11434"));
        assert_eq!(merged.search.max_results, 5);
        assert_eq!(merged.search.api_key_env, "TAVILY_API_KEY");
        assert_eq!(merged.pipeline.knowledge_base, "papers");
        assert_eq!(merged.pipeline.top_k, 6);
        assert_eq!(merged.pipeline.grade_concurrency, 4);
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.no_color);
    }
}
