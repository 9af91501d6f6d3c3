use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
    Client,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{
    GenerationError, GenerationKind, GenerationOutput, GenerationRequest, GenerationResult,
    Generator,
};
use crate::config::GeneratorConfig;

/// Answers text requests through chat completions. Media kinds are rejected.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig, api_key: &SecretString) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key.expose_secret());
        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// The agent persona followed by the call's prompt.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut lines = vec![
        format!("You are {}, an AI assistant.", request.agent_name),
        "Be concise, objective, and return concrete values when possible.".to_string(),
    ];
    if let Some(capability) = request
        .bound_config
        .as_ref()
        .and_then(|config| config.capability.as_ref())
    {
        lines.push(format!(
            "You can use the tool {}({}).",
            capability.name, capability.params
        ));
    }
    if !request.external_services.is_empty() {
        let services = request
            .external_services
            .iter()
            .map(|service| format!("{} ({})", service.name, service.params))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Available services: {services}."));
    }
    lines.push(String::new());
    lines.push(request.prompt.clone());
    lines.join("\n")
}

#[async_trait]
impl Generator for OpenAiGenerator {
    #[tracing::instrument(skip(self, request), fields(key = %request.key))]
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        if request.kind != GenerationKind::Text {
            return Err(GenerationError::Unsupported(request.kind));
        }

        let prompt = build_prompt(request);
        debug!("prompt: {}", prompt);

        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt),
                name: None,
            },
        )];

        let completion = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_completion_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(completion)
            .await
            .map_err(|e| GenerationError::Api(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(GenerationOutput::Content)
            .ok_or_else(|| GenerationError::Api("No response content".into()))
    }
}
