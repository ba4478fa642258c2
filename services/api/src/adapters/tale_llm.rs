//! services/api/src/adapters/tale_llm.rs
//!
//! This module contains the adapter for the tale-condensing LLM.
//! It implements the `TaleService` port from the `core` crate.

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
    domain::{PetProfile, TaleLength},
    ports::{PortError, PortResult, TaleService},
    prompts::{tale_prompt, TALE_SYSTEM_PROMPT},
};

/// An adapter that implements `TaleService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTaleAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTaleAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl TaleService for OpenAiTaleAdapter {
    async fn condense_story(
        &self,
        story_text: &str,
        profile: &PetProfile,
        length: TaleLength,
    ) -> PortResult<String> {
        let prompt = tale_prompt(story_text, profile, length, Utc::now().date_naive())
            .ok_or_else(|| {
                PortError::Unexpected(format!("{:?} tales are not condensed", length))
            })?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(TALE_SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
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

        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content.trim().to_string())
            } else {
                Err(PortError::Unexpected(
                    "Tale LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Tale LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
