//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the tutoring chat LLM.
//! It implements the `ChatCompletionService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS_TEMPLATE: &str = r#"You are a helpful assistant teaching English to a young learner (age level: {age_level}, {age_category}).
Use only simple words appropriate for this age.
Respond with short, encouraging messages.
Only use the following words: {vocabulary}.
Keep responses under 20 words."#;

/// Sent back when the model returns no text.
const FALLBACK_REPLY: &str = "Sorry, I don't understand.";

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
use baby_english_core::{
    domain::AgeLevel,
    ports::{ChatCompletion, ChatCompletionService, PortError, PortResult},
    vocabulary::Vocabulary,
};
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatCompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    /// Renders the system prompt with the learner's level and permitted words.
    pub fn system_prompt(age_level: AgeLevel, vocabulary: &Vocabulary) -> String {
        let words = vocabulary
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        SYSTEM_INSTRUCTIONS_TEMPLATE
            .replace("{age_level}", &age_level.to_string())
            .replace("{age_category}", &age_level.category().as_str().to_lowercase())
            .replace("{vocabulary}", &words)
    }
}

//=========================================================================================
// `ChatCompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatCompletionService for OpenAiChatAdapter {
    async fn reply(
        &self,
        age_level: AgeLevel,
        vocabulary: &Vocabulary,
        message: &str,
    ) -> PortResult<ChatCompletion> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(Self::system_prompt(age_level, vocabulary))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(message)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let total_tokens = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| {
                warn!("Chat LLM returned no text content, using the fallback reply.");
                FALLBACK_REPLY.to_string()
            });

        debug!(total_tokens, "Chat LLM replied");
        Ok(ChatCompletion {
            reply,
            total_tokens,
        })
    }
}
