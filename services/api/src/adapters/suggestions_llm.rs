//! services/api/src/adapters/suggestions_llm.rs
//!
//! This module contains the adapter for the continuation-suggestion LLM.
//! It implements the `SuggestionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use pet_tales_core::{
    domain::PetProfile,
    ports::{PortError, PortResult, SuggestionService},
    prompts::{parse_suggestions, suggestion_prompt, SUGGESTION_SYSTEM_PROMPT},
};
use tracing::warn;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SuggestionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSuggestionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSuggestionAdapter {
    /// Creates a new `OpenAiSuggestionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `SuggestionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SuggestionService for OpenAiSuggestionAdapter {
    /// Asks the model for continuations of the story's last sentence. The answer must
    /// carry a JSON `suggestions` list; anything else is an error.
    async fn suggest_continuations(
        &self,
        story_text: &str,
        profile: &PetProfile,
    ) -> PortResult<Vec<String>> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SUGGESTION_SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(suggestion_prompt(story_text, profile, Utc::now().date_naive()))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Suggestion LLM response contained no text content.".to_string())
            })?;

        parse_suggestions(&content).ok_or_else(|| {
            warn!(raw = %content, "Suggestion LLM answer did not contain a suggestion list");
            PortError::Unexpected("Suggestion LLM answer was not a suggestion list.".to_string())
        })
    }
}
