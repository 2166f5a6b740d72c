//! Prompt loader for built-in and workspace YAML prompt definitions.

use crate::types::{PromptDefinition, PromptOrigin};
use crag_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Prompt used to grade one retrieved document.
pub const GRADE_PROMPT_ID: &str = "crag.grade";

/// Prompt used to rewrite a question for web search.
pub const REWRITE_PROMPT_ID: &str = "crag.rewrite";

/// Prompt used to generate the final answer.
pub const GENERATE_PROMPT_ID: &str = "crag.generate";

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (GRADE_PROMPT_ID, include_str!("../prompts/crag.grade.yml")),
    (REWRITE_PROMPT_ID, include_str!("../prompts/crag.rewrite.yml")),
    (GENERATE_PROMPT_ID, include_str!("../prompts/crag.generate.yml")),
];

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in the workspace's `.crag/prompts/` directory
/// overrides the built-in definition of the same ID.
///
/// # Example
/// ```no_run
/// use crag_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "crag.grade")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompt_path(workspace_path, prompt_id);

    let (contents, origin) = if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);
        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;
        (contents, PromptOrigin::Workspace)
    } else {
        let contents = builtin_source(prompt_id).ok_or_else(|| {
            AppError::Prompt(format!(
                "Prompt '{}' is not built in and no override exists at {:?}",
                prompt_id, prompt_file
            ))
        })?;
        (contents.to_string(), PromptOrigin::Builtin)
    };

    let definition = parse_prompt(&contents, prompt_id)?;

    tracing::debug!(
        "Loaded prompt: {} ({}, {:?})",
        definition.id,
        definition.title,
        origin
    );

    Ok(definition)
}

/// List all available prompt IDs with their origin, built-ins first.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<(String, PromptOrigin)>> {
    let mut prompts: Vec<(String, PromptOrigin)> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| (id.to_string(), PromptOrigin::Builtin))
        .collect();

    let prompts_dir = workspace_path.join(".crag/prompts");
    if !prompts_dir.exists() {
        return Ok(prompts);
    }

    for entry in walkdir::WalkDir::new(&prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                match prompts.iter_mut().find(|(id, _)| id == stem) {
                    Some(existing) => existing.1 = PromptOrigin::Workspace,
                    None => prompts.push((stem.to_string(), PromptOrigin::Workspace)),
                }
            }
        }
    }

    Ok(prompts)
}

fn prompt_path(workspace_path: &Path, prompt_id: &str) -> PathBuf {
    workspace_path
        .join(".crag/prompts")
        .join(format!("{}.yml", prompt_id))
}

fn builtin_source(prompt_id: &str) -> Option<&'static str> {
    BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(_, src)| *src)
}

fn parse_prompt(contents: &str, prompt_id: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML '{}': {}", prompt_id, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
