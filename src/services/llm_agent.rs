use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, Role, CreateChatCompletionRequest,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent,
    },
    Client,
};
use async_trait::async_trait;

use crate::error::OracleError;

/// One completion call. Borrowed so callers can reuse their prompt buffers.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub model: &'a str,
    pub max_tokens: u16,
    pub temperature: f32,
}

/// Opaque text generator.
///
/// No timeout or retry happens behind this trait; callers wanting either
/// wrap the call themselves.
#[async_trait]
pub trait TextOracle: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, OracleError>;
}

/// Chat-completions oracle. Built without a key, every call reports
/// [`OracleError::Unavailable`].
pub struct OpenAiOracle {
    client: Option<Client<OpenAIConfig>>,
}

impl OpenAiOracle {
    pub fn new(api_key: Option<&str>) -> Self {
        let client = api_key.map(|key| {
            let config = OpenAIConfig::new().with_api_key(key);
            Client::with_config(config)
        });

        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl TextOracle for OpenAiOracle {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, OracleError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| OracleError::Unavailable("OPENAI_API_KEY is not configured".to_string()))?;

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: request.system_prompt.to_string(),
                    name: None,
                    role: Role::System,
                }
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(request.user_prompt.to_string()),
                    name: None,
                    role: Role::User,
                }
            ),
        ];

        let chat_request = CreateChatCompletionRequest {
            model: request.model.to_string(),
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            ..Default::default()
        };

        tracing::debug!("Sending completion request to {}", request.model);
        let response = client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Request("Completion returned no content".to_string()))
    }
}
