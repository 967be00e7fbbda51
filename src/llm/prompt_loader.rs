//! Selects the verbose or concise prompt variant per phase and model class,
//! then substitutes `{name}` placeholders without corrupting literal JSON
//! braces embedded in the template (spec.md §4.10, §9).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::embedded::PromptAssets;
use crate::pipeline::state::ModelClass;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("static pattern is valid"));

const ESCAPED_OPEN: &str = "\u{0}__FITCHECK_BRACE_OPEN__\u{0}";
const ESCAPED_CLOSE: &str = "\u{0}__FITCHECK_BRACE_CLOSE__\u{0}";

/// Loads `<phase>.verbose.tpl` / `<phase>.concise.tpl` from the embedded
/// `assets/prompts/` directory. Reasoning-class models get the concise
/// variant (objective + criteria + JSON contract, no step-by-step
/// scaffolding, avoiding the double-reasoning anti-pattern of spec.md §9);
/// standard models get the verbose variant. Falls back to verbose if the
/// concise file is missing for a given phase.
pub struct PromptLoader;

impl PromptLoader {
    pub fn load(phase: &str, model_class: ModelClass) -> Result<String, PromptError> {
        let preferred = match model_class {
            ModelClass::Reasoning => format!("{phase}.concise.tpl"),
            ModelClass::Standard => format!("{phase}.verbose.tpl"),
        };

        if let Some(file) = PromptAssets::get(&preferred) {
            return Ok(String::from_utf8_lossy(&file.data).into_owned());
        }

        let fallback = format!("{phase}.verbose.tpl");
        PromptAssets::get(&fallback)
            .map(|file| String::from_utf8_lossy(&file.data).into_owned())
            .ok_or_else(|| PromptError::MissingTemplate(phase.to_string()))
    }

    /// Substitutes `{name}` placeholders from `params`. A literal `{` or `}`
    /// in the template (e.g. inside a JSON example) must be written doubled
    /// (`{{` / `}}`) and survives untouched. Placeholders with no matching
    /// key in `params` are left as-is rather than silently dropped, so a
    /// template typo surfaces instead of producing truncated prompts.
    pub fn render(template: &str, params: &HashMap<&str, String>) -> String {
        let protected = template.replace("{{", ESCAPED_OPEN).replace("}}", ESCAPED_CLOSE);

        let substituted = PLACEHOLDER
            .replace_all(&protected, |caps: &regex::Captures| {
                let name = &caps[1];
                params.get(name).cloned().unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        substituted.replace(ESCAPED_OPEN, "{").replace(ESCAPED_CLOSE, "}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("no prompt template found for phase '{0}' (neither concise nor verbose variant)")]
    MissingTemplate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_named_placeholders() {
        let mut params = HashMap::new();
        params.insert("company", "Vercel".to_string());
        let out = PromptLoader::render("Research {company} thoroughly.", &params);
        assert_eq!(out, "Research Vercel thoroughly.");
    }

    #[test]
    fn literal_json_braces_survive_templating_unchanged() {
        let template = r#"Return JSON like {{"query_type": "company", "company_name": "{company}"}}"#;
        let mut params = HashMap::new();
        params.insert("company", "Vercel".to_string());
        let out = PromptLoader::render(template, &params);
        assert_eq!(out, r#"Return JSON like {"query_type": "company", "company_name": "Vercel"}"#);
    }

    #[test]
    fn unknown_placeholder_left_untouched() {
        let out = PromptLoader::render("Hello {unknown}", &HashMap::new());
        assert_eq!(out, "Hello {unknown}");
    }
}
