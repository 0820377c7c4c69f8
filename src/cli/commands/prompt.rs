//! Prompt command implementation.

use super::open_knowledge_base;
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::persona::{build_system_prompt_with, PersonaProfile};
use crate::rag::{CoachResponder, ContextRetriever};
use anyhow::Result;
use std::path::Path;

/// Run the prompt command.
pub async fn run_prompt(profile_path: &str, message: Option<&str>, reply: bool, settings: Settings) -> Result<()> {
    let profile = PersonaProfile::from_file(Path::new(profile_path))?;
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;

    let Some(message) = message else {
        println!("{}", build_system_prompt_with(&profile, &prompts));
        return Ok(());
    };

    let (embedder, store) = open_knowledge_base(&settings)?;
    let retriever = ContextRetriever::from_settings(&settings.retrieval, store, embedder);
    let responder = CoachResponder::new(retriever, &settings.responder)?.with_prompts(prompts);

    if !reply {
        let (prompt, knowledge) = responder.prepare(&profile, message, &[]).await;
        println!("{}", prompt);
        Output::info(&format!("Grounded on {} passages", knowledge.len()));
        return Ok(());
    }

    let spinner = Output::spinner(&format!("{} is thinking...", profile.name));
    let result = responder.respond(&profile, message, &[]).await;
    spinner.finish_and_clear();

    let reply = result?;
    println!("{}", reply.text);
    Output::kv("Passages used", &reply.knowledge.len().to_string());
    Ok(())
}
