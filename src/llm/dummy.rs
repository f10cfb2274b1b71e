use super::{CompletionRequest, LLM};
use crate::{LLMError, TranslationResult};
use anyhow::anyhow;
use std::sync::Mutex;

/// What a [`DummyLLM`] answers with.
#[derive(Debug, Clone)]
pub enum DummyReply {
    /// Serialized as the JSON the real endpoint would return.
    Translation(TranslationResult),
    /// Returned verbatim, for exercising response validation.
    Raw(String),
    ConnectionFailure(String),
    ApiFailure(String),
}

/// Offline stand-in for a hosted model, answers every request the same way.
#[derive(Debug)]
pub struct DummyLLM {
    reply: DummyReply,
    prompts: Mutex<Vec<String>>,
}

impl DummyLLM {
    pub fn new(reply: DummyReply) -> Self {
        DummyLLM {
            reply,
            prompts: Mutex::new(vec![]),
        }
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

impl LLM for DummyLLM {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LLMError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.to_owned());
        }
        match &self.reply {
            DummyReply::Translation(result) => {
                serde_json::to_string(result).map_err(|err| LLMError::OtherError(err.into()))
            }
            DummyReply::Raw(raw) => Ok(raw.clone()),
            DummyReply::ConnectionFailure(msg) => Err(LLMError::ConnectionError(anyhow!("{msg}"))),
            DummyReply::ApiFailure(msg) => Err(LLMError::ApiError(anyhow!("{msg}"))),
        }
    }
}
