//! Prompt composition and coach response generation.

use super::ContextRetriever;
use crate::config::{ComposerPrompts, Prompts, ResponderSettings};
use crate::error::{KbError, Result};
use crate::openai::{create_client, map_openai_error};
use crate::persona::{build_system_prompt_with, PersonaProfile};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Number of history turns included in a prompt.
pub const DEFAULT_HISTORY_TURNS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

/// One prior message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Compose the final prompt with the built-in section headers.
pub fn compose_prompt(system_prompt: &str, knowledge: &[String], history: &[ChatTurn], message: &str) -> String {
    compose_prompt_with(
        &ComposerPrompts::default(),
        DEFAULT_HISTORY_TURNS,
        system_prompt,
        knowledge,
        history,
        message,
    )
}

/// Compose the final prompt.
///
/// Layout: system prompt, the knowledge block (only when there is knowledge,
/// entries numbered from 1 in the given order), the last `history_turns`
/// turns, then the user message and an open assistant turn.
pub fn compose_prompt_with(
    headers: &ComposerPrompts,
    history_turns: usize,
    system_prompt: &str,
    knowledge: &[String],
    history: &[ChatTurn],
    message: &str,
) -> String {
    let mut prompt = String::from(system_prompt);

    if !knowledge.is_empty() {
        let entries = knowledge
            .iter()
            .enumerate()
            .map(|(i, content)| format!("[{}] {}", i + 1, content))
            .collect::<Vec<_>>()
            .join("\n\n");
        prompt.push_str(&format!("\n\n{}\n{}", headers.knowledge_header, entries));
    }

    let recent = &history[history.len().saturating_sub(history_turns)..];
    let conversation = recent
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    prompt.push_str(&format!(
        "\n\n{}\n{}\n\nUSER: {}\n\nASSISTANT:",
        headers.history_header, conversation, message
    ));
    prompt
}

/// A generated coach reply with the knowledge it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct CoachReply {
    pub text: String,
    pub knowledge: Vec<String>,
}

/// Generates in-character coach replies grounded on the coach's own content.
pub struct CoachResponder {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    retriever: ContextRetriever,
    prompts: Prompts,
    history_turns: usize,
}

impl CoachResponder {
    pub fn new(retriever: ContextRetriever, settings: &ResponderSettings) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: settings.model.clone(),
            retriever,
            prompts: Prompts::default(),
            history_turns: settings.history_turns,
        })
    }

    /// Use custom prompt templates.
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Build the prompt for a message without calling the model.
    ///
    /// Retrieval failures degrade to an ungrounded prompt.
    pub async fn prepare(
        &self,
        profile: &PersonaProfile,
        message: &str,
        history: &[ChatTurn],
    ) -> (String, Vec<String>) {
        let knowledge = match self
            .retriever
            .retrieve(&profile.id, message, self.retriever.top_k())
            .await
        {
            Ok(knowledge) => knowledge,
            Err(e) => {
                warn!("Knowledge retrieval failed for {}: {}", profile.id, e);
                Vec::new()
            }
        };
        if !knowledge.is_empty() {
            debug!("Retrieved {} knowledge chunks for {}", knowledge.len(), profile.id);
        }

        let system_prompt = build_system_prompt_with(profile, &self.prompts);
        let prompt = compose_prompt_with(
            &self.prompts.composer,
            self.history_turns,
            &system_prompt,
            &knowledge,
            history,
            message,
        );
        (prompt, knowledge)
    }

    /// Generate the coach's reply to `message`.
    #[instrument(skip(self, profile, history), fields(coach = %profile.id))]
    pub async fn respond(
        &self,
        profile: &PersonaProfile,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<CoachReply> {
        let (prompt, knowledge) = self.prepare(profile, message, history).await;

        let messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| KbError::provider("openai", e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .build()
            .map_err(|e| KbError::provider("openai", e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(map_openai_error)?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| KbError::provider("openai", "Empty response from model"))?
            .clone();

        info!("Generated reply grounded on {} chunks", knowledge.len());
        Ok(CoachReply { text, knowledge })
    }
}
