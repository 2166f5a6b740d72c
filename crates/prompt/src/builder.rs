//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use crag_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system and the user template are rendered with the same
/// variables. Missing variables render as empty strings.
///
/// # Example
/// ```no_run
/// use crag_prompt::{build_prompt, load_prompt};
/// use std::collections::HashMap;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(Path::new("."), "crag.rewrite")?;
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "What is LangGraph?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let system = match definition.system {
        Some(ref system) => Some(render_template(system, &variables)?.trim().to_string()),
        None => None,
    };
    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        json_output: definition.output.is_json(),
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            resolved_variables: variables,
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
