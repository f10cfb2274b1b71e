pub mod config;
pub mod language;
pub mod llm;
pub mod session;
pub mod utils;

use crate::config::AppConfig;
use crate::llm::openai::{OpenAiChat, OpenAiChatBuilder};
use crate::llm::{CompletionRequest, LLM, OutputSchema};
use crate::utils::excerpt;
use anyhow::anyhow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;
use std::sync::LazyLock;

pub use crate::language::Language;
pub use crate::session::ChatSession;

pub const FALLBACK_TRANSLATION: &str =
    "Sorry, an error occurred during translation. Please try again.";

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid fenced block regex")
});

/// Builds the translator backed by the configured remote endpoint.
pub fn translator<RE: Fn(&str)>(
    cfg: &AppConfig,
    report_error: Option<RE>,
) -> LlmTranslationService<OpenAiChat, RE> {
    let llm = OpenAiChatBuilder::from_config(cfg).build();
    LlmTranslationService::new(llm, report_error)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub source_language: String,
    pub target_language: String,
    pub translated_text: String,
    pub original_text: String,
}

impl TranslationResult {
    pub fn fallback(text: &str, source_lang: &str, target_lang: &str) -> Self {
        TranslationResult {
            source_language: source_lang.to_owned(),
            target_language: target_lang.to_owned(),
            translated_text: FALLBACK_TRANSLATION.to_owned(),
            original_text: text.to_owned(),
        }
    }

    pub fn output_schema() -> OutputSchema {
        let field = |description: &str| json!({ "type": "string", "description": description });
        OutputSchema {
            name: "translation_result".to_owned(),
            description: "A word-by-word translation of the input text".to_owned(),
            schema: json!({
                "type": "object",
                "properties": {
                    "source_language": field("The language of the input text"),
                    "target_language": field("The language the text was translated to"),
                    "translated_text": field("The word-by-word translated text"),
                    "original_text": field("The original input text"),
                },
                "required": ["source_language", "target_language", "translated_text", "original_text"],
                "additionalProperties": false,
            }),
        }
    }

    /// Validates raw model output against the schema.
    ///
    /// Accepts the JSON object either bare or wrapped in a Markdown code fence,
    /// which some OpenAI-compatible endpoints do even in JSON schema mode.
    pub fn from_response(raw: &str) -> Result<Self, LLMError> {
        let json = match FENCED_JSON.captures(raw) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => raw.trim(),
        };
        serde_json::from_str(json).map_err(|err| {
            LLMError::SchemaError(anyhow!(
                "Response does not match the translation schema: {err} (got \"{}\")",
                excerpt(raw, 80)
            ))
        })
    }
}

#[derive(Debug)]
pub enum LLMError {
    ConnectionError(anyhow::Error),
    RateLimitError(anyhow::Error),
    ApiError(anyhow::Error),
    /// The endpoint answered with a body the client could not decode, usually an
    /// error envelope in a non-OpenAI shape (Gemini sends a JSON array).
    ProtocolError(anyhow::Error),
    SchemaError(anyhow::Error),
    OtherError(anyhow::Error),
}

impl LLMError {
    /// Whether a later identical attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::ConnectionError(_)
                | LLMError::RateLimitError(_)
                | LLMError::ProtocolError(_)
        )
    }
}

impl Display for LLMError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMError::ConnectionError(e) => {
                write!(f, "Connection error: {}", e)
            }
            LLMError::RateLimitError(e) => {
                write!(f, "Rate limited: {}", e)
            }
            LLMError::ApiError(e) => {
                write!(f, "API error: {}", e)
            }
            LLMError::ProtocolError(e) => {
                write!(f, "Unreadable reply from the endpoint: {}", e)
            }
            LLMError::SchemaError(e) => {
                write!(f, "Malformed response: {}", e)
            }
            LLMError::OtherError(e) => {
                write!(f, "Error: {}", e)
            }
        }
    }
}

impl std::error::Error for LLMError {}

#[allow(async_fn_in_trait)]
pub trait TranslationService {
    /// Always resolves; failures come back as [`TranslationResult::fallback`].
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str)
    -> TranslationResult;
}

pub struct LlmTranslationService<L, RE> {
    llm: L,
    report_error: Option<RE>,
}

impl<L, RE> LlmTranslationService<L, RE>
where
    L: LLM,
    RE: Fn(&str),
{
    pub fn new(llm: L, report_error: Option<RE>) -> Self {
        LlmTranslationService { llm, report_error }
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    /// Single remote call with the error left to the caller.
    pub async fn try_translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslationResult, LLMError> {
        let prompt = llm::compose_prompt(text, source_lang, target_lang);
        let schema = TranslationResult::output_schema();
        let request = CompletionRequest {
            system: llm::SYSTEM_INSTRUCTIONS,
            prompt: &prompt,
            schema: &schema,
        };

        let raw = self.llm.complete(&request).await?;
        let mut result = TranslationResult::from_response(&raw)?;

        // The echo is informational, callers rely on getting their own input back.
        if result.original_text != text {
            log::debug!(
                r#"Model echoed "{}" instead of the original text"#,
                excerpt(&result.original_text, 40)
            );
            result.original_text = text.to_owned();
        }
        Ok(result)
    }
}

impl<L, RE> TranslationService for LlmTranslationService<L, RE>
where
    L: LLM,
    RE: Fn(&str),
{
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult {
        match self.try_translate(text, source_lang, target_lang).await {
            Ok(result) => {
                log::info!("Translated {} -> {}", source_lang, target_lang);
                result
            }
            Err(err) => {
                log::error!("Translation {} -> {} failed: {}", source_lang, target_lang, err);
                if let Some(report_error) = self.report_error.as_ref() {
                    report_error(&format!("Error during translation: {err}"));
                }
                TranslationResult::fallback(text, source_lang, target_lang)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::dummy::{DummyLLM, DummyReply};
    use std::cell::RefCell;

    fn perro() -> TranslationResult {
        TranslationResult {
            source_language: "English".to_owned(),
            target_language: "Spanish".to_owned(),
            translated_text: "perro".to_owned(),
            original_text: "dog".to_owned(),
        }
    }

    fn service(reply: DummyReply) -> LlmTranslationService<DummyLLM, fn(&str)> {
        LlmTranslationService::new(DummyLLM::new(reply), None)
    }

    #[tokio::test]
    async fn success_is_passed_through() {
        let svc = service(DummyReply::Translation(perro()));
        let res = svc.translate("dog", "English", "Spanish").await;
        assert_eq!(res, perro());
        assert_eq!(
            svc.llm().prompts(),
            vec!["Translate from English to Spanish: dog".to_owned()]
        );
    }

    #[tokio::test]
    async fn remote_languages_are_not_rewritten() {
        let mut remote = perro();
        remote.source_language = "English (detected)".to_owned();
        let svc = service(DummyReply::Translation(remote.clone()));

        let res = svc.translate("dog", "English", "Spanish").await;
        assert_eq!(res.source_language, "English (detected)");
        assert_eq!(res.target_language, remote.target_language);
        assert_eq!(res.translated_text, remote.translated_text);
    }

    #[tokio::test]
    async fn original_text_is_always_the_input() {
        let mut remote = perro();
        remote.original_text = "Dog.".to_owned();
        let svc = service(DummyReply::Translation(remote));

        let res = svc.translate("dog", "English", "Spanish").await;
        assert_eq!(res.original_text, "dog");
        assert_eq!(res.translated_text, "perro");
    }

    #[tokio::test]
    async fn network_failure_falls_back_and_reports_once() {
        let notices = RefCell::new(vec![]);
        let svc = LlmTranslationService::new(
            DummyLLM::new(DummyReply::ConnectionFailure("connection refused".to_owned())),
            Some(|notice: &str| notices.borrow_mut().push(notice.to_owned())),
        );

        let res = svc.translate("dog", "English", "Spanish").await;
        assert_eq!(res, TranslationResult::fallback("dog", "English", "Spanish"));
        assert_eq!(res.translated_text, FALLBACK_TRANSLATION);

        drop(svc);
        let notices = notices.into_inner();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].starts_with("Error during translation:"));
        assert!(notices[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn schema_mismatch_falls_back() {
        let svc = service(DummyReply::Raw(
            r#"{"source_language": "English", "translated_text": "perro"}"#.to_owned(),
        ));
        let res = svc.translate("dog", "English", "Spanish").await;
        assert_eq!(res.translated_text, FALLBACK_TRANSLATION);
        assert_eq!(res.source_language, "English");
        assert_eq!(res.target_language, "Spanish");
        assert_eq!(res.original_text, "dog");
    }

    #[tokio::test]
    async fn null_fields_are_rejected() {
        let svc = service(DummyReply::Raw(
            r#"{"source_language": "English", "target_language": "Spanish",
                "translated_text": null, "original_text": "dog"}"#
                .to_owned(),
        ));
        let err = svc
            .try_translate("dog", "English", "Spanish")
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::SchemaError(_)));
    }

    #[tokio::test]
    async fn api_error_is_exposed_by_try_translate() {
        let svc = service(DummyReply::ApiFailure("invalid key".to_owned()));
        let err = svc
            .try_translate("dog", "English", "Spanish")
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::ApiError(_)));
        assert!(err.to_string().contains("invalid key"));
    }

    #[tokio::test]
    async fn identical_calls_give_identical_results() {
        let svc = service(DummyReply::Translation(perro()));
        let first = svc.translate("dog", "English", "Spanish").await;
        let second = svc.translate("dog", "English", "Spanish").await;
        assert_eq!(first, second);
        assert_eq!(svc.llm().prompts().len(), 2);
    }

    #[test]
    fn fenced_response_is_accepted() {
        let raw = "```json\n{\"source_language\": \"English\", \"target_language\": \"French\", \
                   \"translated_text\": \"Bonjour\", \"original_text\": \"Hello\"}\n```";
        let res = TranslationResult::from_response(raw).unwrap();
        assert_eq!(res.translated_text, "Bonjour");
    }

    #[test]
    fn plain_text_response_is_rejected() {
        let err = TranslationResult::from_response("Bonjour").unwrap_err();
        assert!(matches!(err, LLMError::SchemaError(_)));
    }

    #[test]
    fn schema_requires_all_four_fields() {
        let schema = TranslationResult::output_schema().schema;
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        assert_eq!(schema["additionalProperties"], false);
        for field in required {
            let name = field.as_str().unwrap();
            assert_eq!(schema["properties"][name]["type"], "string");
        }
    }
}
