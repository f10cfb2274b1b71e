use super::{CompletionRequest, LLM};
use crate::LLMError;
use crate::config::{AppConfig, RetryConfig};
use crate::utils::excerpt;
use anyhow::anyhow;
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use backoff::ExponentialBackoff;
use std::error::Error;
use std::time::Duration;

const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

/// Builder for OpenAI-compatible chat completion endpoints
pub struct OpenAiChatBuilder {
    api_base: String,
    model: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl OpenAiChatBuilder {
    pub fn new(api_base: String, model: String, api_key: Option<String>) -> Self {
        OpenAiChatBuilder {
            api_base,
            model,
            api_key,
            retry: RetryConfig::default(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        OpenAiChatBuilder::new(cfg.api_base.clone(), cfg.model.clone(), cfg.api_key.clone())
            .with_retry(cfg.retry.clone())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(&self) -> OpenAiChat {
        // An empty key is sent rather than falling back to OPENAI_API_KEY,
        // the endpoint rejects it and the caller's fallback path takes over.
        let config = OpenAIConfig::new()
            .with_api_base(self.api_base.trim_end_matches('/'))
            .with_api_key(self.api_key.as_deref().unwrap_or_default());

        if self.api_key.is_none() {
            log::warn!("No API key configured, requests to {} will fail", self.api_base);
        }

        // Retries are ours to decide, the client must not sit on 429s by itself.
        let no_backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..ExponentialBackoff::default()
        };
        let client = Client::with_config(config).with_backoff(no_backoff);

        OpenAiChat {
            client,
            model: self.model.clone(),
            retry: self.retry.clone(),
        }
    }
}

pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryConfig,
}

impl LLM for OpenAiChat {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LLMError> {
        let req = self.to_chat_request(request)?;

        log::info!(
            r#"Sending prompt "{}" to {}"#,
            excerpt(request.prompt, 40),
            self.model
        );

        let response = super::with_retries(&self.retry, || {
            let req = req.clone();
            async move { Ok(self.client.chat().create(req).await?) }
        })
        .await?;

        if let Some(usage) = response.usage.as_ref() {
            log::debug!(
                "Completion used {} prompt + {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::SchemaError(anyhow!("Response has no choices")))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(LLMError::ApiError(anyhow!("Model refused: {refusal}")));
        }

        choice
            .message
            .content
            .ok_or_else(|| LLMError::SchemaError(anyhow!("Response message has no content")))
    }
}

impl OpenAiChat {
    fn to_chat_request(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<CreateChatCompletionRequest, LLMError> {
        let schema = request.schema;
        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system.trim())
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.prompt)
                    .build()?
                    .into(),
            ])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: Some(schema.description.clone()),
                    name: schema.name.clone(),
                    schema: Some(schema.schema.clone()),
                    strict: Some(true),
                },
            })
            .build()?;
        Ok(req)
    }
}

impl From<OpenAIError> for LLMError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => LLMError::ConnectionError(if let Some(e) = e.source() {
                anyhow!("{e}")
            } else {
                e.into()
            }),
            OpenAIError::ApiError(e) => {
                let rate_limited = [e.code.as_deref(), e.r#type.as_deref()]
                    .contains(&Some(RATE_LIMIT_CODE));
                if rate_limited {
                    LLMError::RateLimitError(anyhow!("{e}"))
                } else {
                    LLMError::ApiError(anyhow!("{e}"))
                }
            }
            // The HTTP status is gone by now; this is almost always an error
            // envelope async-openai does not understand, e.g. Gemini's 429 array.
            OpenAIError::JSONDeserialize(e) => LLMError::ProtocolError(anyhow!(
                "could not decode the reply, likely a non-OpenAI error body ({e})"
            )),
            OpenAIError::FileSaveError(e) => LLMError::OtherError(anyhow!("{e}")),
            OpenAIError::FileReadError(e) => LLMError::OtherError(anyhow!("{e}")),
            OpenAIError::StreamError(e) => LLMError::ConnectionError(anyhow!("{e}")),
            OpenAIError::InvalidArgument(e) => LLMError::OtherError(anyhow!("{e}")),
        }
    }
}
