//! Where a knowledge base lives on disk, and its `config.yaml`.
//!
//! ```text
//! .crag/knowledge/<base>/config.yaml
//! .crag/knowledge/<base>/index.sqlite
//! ```

use crate::types::KnowledgeBaseConfig;
use crag_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Base names become directory names, so separators and dot segments are
/// refused.
pub fn validate_base_name(base_name: &str) -> AppResult<()> {
    let valid = !base_name.is_empty()
        && !base_name.starts_with('.')
        && base_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::Knowledge(format!(
            "Invalid knowledge base name '{}' (letters, digits, '-', '_' and '.' only)",
            base_name
        )))
    }
}

/// The base's settings, or the defaults for a base never configured. The
/// name always follows the directory, whatever the file says.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    validate_base_name(base_name)?;
    let config_path = get_config_path(workspace, base_name);

    let content = match fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config for base '{}', using defaults", base_name);
            return Ok(KnowledgeBaseConfig {
                name: base_name.to_string(),
                ..Default::default()
            });
        }
        Err(e) => {
            return Err(AppError::Knowledge(format!(
                "Failed to read config at {:?}: {}",
                config_path, e
            )))
        }
    };

    let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Knowledge(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;
    config.name = base_name.to_string();

    tracing::debug!(
        "Base '{}' uses {} embeddings, chunks of {}",
        base_name,
        config.provider,
        config.chunk_size
    );
    Ok(config)
}

/// Persist the settings a base was learned with, so later searches embed
/// queries the same way.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Knowledge(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize config: {}", e)))?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Knowledge(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved knowledge base config for '{}'", config.name);
    Ok(())
}

pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace.join(".crag").join("knowledge").join(base_name)
}

pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

pub fn get_index_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("index.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), "test-base").unwrap();

        assert_eq!(config.name, "test-base");
        assert_eq!(config.provider, "trigram");
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.chunk_overlap, 0);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = KnowledgeBaseConfig {
            name: "my-base".to_string(),
            chunk_size: 1024,
            ..Default::default()
        };

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path(), "my-base").unwrap();
        assert_eq!(loaded.name, "my-base");
        assert_eq!(loaded.chunk_size, 1024);
    }

    #[test]
    fn test_base_names_cannot_leave_the_knowledge_dir() {
        let temp = TempDir::new().unwrap();
        for name in ["../outside", "a/b", "", ".hidden", "with space"] {
            assert!(load_config(temp.path(), name).is_err(), "accepted {:?}", name);
        }
        assert!(validate_base_name("papers-2024_v1.2").is_ok());
    }

    #[test]
    fn test_paths_live_under_crag_dir() {
        let ws = Path::new("/ws");
        assert_eq!(
            get_index_path(ws, "papers"),
            PathBuf::from("/ws/.crag/knowledge/papers/index.sqlite")
        );
    }
}
