pub mod dummy;
pub mod openai;

use crate::LLMError;
use crate::config::RetryConfig;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use std::future::Future;

/// Instruction sent alongside every translation prompt.
pub const SYSTEM_INSTRUCTIONS: &str = r#"
You are a professional word-by-word translator.

Your task is to translate text between languages, focusing on accurate word-by-word translation:

1. Translate the input text from the source language to the target language
2. Maintain a word-by-word approach rather than contextual/idiomatic translation
3. Always provide the translation even if the result might sound unnatural

Return the translation in the following fields:
- source_language: The language of the input text
- target_language: The language the text was translated to
- translated_text: The word-by-word translated text
- original_text: The original input text

If the input is not clear, identify the apparent language and respond professionally.
"#;

/// Shape the model is asked to fill in, sent as a JSON schema response format.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub schema: &'a OutputSchema,
}

/// A remote text generation capability: takes a prompt, gives back raw model output.
#[allow(async_fn_in_trait)]
pub trait LLM {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LLMError>;
}

pub fn compose_prompt(text: &str, source_lang: &str, target_lang: &str) -> String {
    format!("Translate from {source_lang} to {target_lang}: {text}")
}

/// Runs `op` until it succeeds, fails with a non-transient error, or `retry.max_attempts` is used up.
pub async fn with_retries<T, F, Fut>(retry: &RetryConfig, mut op: F) -> Result<T, LLMError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LLMError>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: retry.initial_interval(),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };
    backoff.reset();

    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && err.is_transient() => {
                let Some(duration) = backoff.next_backoff() else {
                    return Err(err);
                };
                log::warn!(
                    "Attempt {attempt}/{max_attempts} failed ({err}), retrying in {} ms",
                    duration.as_millis()
                );
                tokio::time::sleep(duration).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
