//! Prompt templates for coach personas.
//!
//! Templates can be customized by placing TOML files in the custom prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder regex is valid"))
}

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub persona: PersonaPrompts,
    pub composer: ComposerPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Template for the persona system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaPrompts {
    pub system: String,
}

impl Default for PersonaPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are {{name}}, {{tagline}}.

PERSONALITY: You are {{personality}}.

EXPERTISE: You specialize in {{expertise}}.

BACKGROUND: {{background}}

COMMUNICATION STYLE: {{conversation_style}}

INSTRUCTIONS:
- Always stay in character as {{name}}
- Provide helpful, actionable advice within your areas of expertise
- Match your personality traits in your responses
- Keep responses concise but meaningful (2-3 sentences max)
- Ask follow-up questions to better understand the user's needs
- Reference your background and expertise when relevant
- Be encouraging and supportive while maintaining your unique personality"#
                .to_string(),
        }
    }
}

/// Section headers used when composing the final chat prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerPrompts {
    pub knowledge_header: String,
    pub history_header: String,
}

impl Default for ComposerPrompts {
    fn default() -> Self {
        Self {
            knowledge_header: "RELEVANT KNOWLEDGE FROM YOUR CONTENT:".to_string(),
            history_header: "CONVERSATION HISTORY:".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let persona_path = custom_path.join("persona.toml");
            if persona_path.exists() {
                let content = std::fs::read_to_string(&persona_path)?;
                prompts.persona = toml::from_str(&content)?;
            }

            let composer_path = custom_path.join("composer.toml");
            if composer_path.exists() {
                let content = std::fs::read_to_string(&composer_path)?;
                prompts.composer = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Placeholders are substituted in one pass over the template: values are
    /// never re-scanned and unknown placeholders are left as written.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        placeholder_regex()
            .replace_all(template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render with both provided variables and custom config variables.
    /// Provided variables take precedence.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        assert_eq!(Prompts::render(template, &vars), "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_render_does_not_expand_substituted_values() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Maya".to_string());
        vars.insert("bio".to_string(), "Trained by {{name}} and {{missing}}".to_string());

        for _ in 0..50 {
            assert_eq!(
                Prompts::render("{{name}}: {{bio}} {{unknown}}", &vars),
                "Maya: Trained by {{name}} and {{missing}} {{unknown}}"
            );
        }
    }

    #[test]
    fn test_custom_variables_are_overridden() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("name".to_string(), "Config".to_string());
        prompts.variables.insert("extra".to_string(), "kept".to_string());

        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Caller".to_string());

        let out = prompts.render_with_custom("{{name}} {{extra}}", &vars);
        assert_eq!(out, "Caller kept");
    }

    #[test]
    fn test_load_custom_persona_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("persona.toml"),
            "system = \"I am {{name}}.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.persona.system, "I am {{name}}.");
        assert_eq!(prompts.composer.knowledge_header, "RELEVANT KNOWLEDGE FROM YOUR CONTENT:");
    }
}
