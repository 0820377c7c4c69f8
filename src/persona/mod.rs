//! Coach personas: profiles, system prompts and the live persona directory.

mod directory;

pub use directory::{PersonaChange, PersonaDirectory, PersonaSource, TomlPersonaSource};

use crate::config::Prompts;
use crate::error::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A coach persona. Its `id` is the knowledge owner id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub conversation_style: String,
    /// Channel whose videos seed this persona's knowledge.
    #[serde(default)]
    pub channel_url: Option<String>,
}

impl PersonaProfile {
    /// Load a profile from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let profile: PersonaProfile = toml::from_str(&content)?;
        if profile.id.trim().is_empty() {
            return Err(KbError::InvalidInput(format!(
                "Persona profile {} has no id",
                path.display()
            )));
        }
        Ok(profile)
    }
}

/// Build a persona's system prompt from the built-in template.
pub fn build_system_prompt(profile: &PersonaProfile) -> String {
    build_system_prompt_with(profile, &Prompts::default())
}

/// Build a persona's system prompt from a (possibly customized) template.
pub fn build_system_prompt_with(profile: &PersonaProfile, prompts: &Prompts) -> String {
    let mut vars = HashMap::new();
    vars.insert("name".to_string(), profile.name.clone());
    vars.insert("tagline".to_string(), profile.tagline.clone());
    vars.insert("personality".to_string(), profile.personality.join(", "));
    vars.insert("expertise".to_string(), profile.expertise.join(", "));
    vars.insert("background".to_string(), profile.background.clone());
    vars.insert("conversation_style".to_string(), profile.conversation_style.clone());

    prompts.render_with_custom(&prompts.persona.system, &vars)
}

#[cfg(test)]
pub(crate) fn sample_profile(id: &str) -> PersonaProfile {
    PersonaProfile {
        id: id.to_string(),
        name: "Maya".to_string(),
        tagline: "your mindful fitness coach".to_string(),
        personality: vec!["calm".to_string(), "direct".to_string()],
        expertise: vec!["strength training".to_string(), "recovery".to_string()],
        background: "Former physiotherapist.".to_string(),
        conversation_style: "Short and encouraging.".to_string(),
        channel_url: None,
    }
}
