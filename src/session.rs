use crate::config::AppConfig;
use crate::{Language, TranslationResult, TranslationService};
use chrono::{DateTime, Local};
use std::panic::{self, AssertUnwindSafe};
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

/// A submitted line waiting for its translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTranslation {
    pub text: String,
    pub source_lang: Language,
    pub target_lang: Language,
}

impl PendingTranslation {
    /// Drives the translation to completion on `handle` from a non-async thread.
    ///
    /// A panic inside the translator is reported through `report_error` and
    /// turned into the fallback result, so the caller always gets an answer.
    pub fn run_blocking<T: TranslationService>(
        &self,
        handle: &Handle,
        translator: &T,
        report_error: impl Fn(&str),
    ) -> TranslationResult {
        let (source_lang, target_lang) = (self.source_lang.name(), self.target_lang.name());
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            handle.block_on(translator.translate(&self.text, source_lang, target_lang))
        }));
        match res {
            Ok(result) => result,
            Err(_) => {
                log::error!("Translation {} -> {} crashed", source_lang, target_lang);
                report_error("Error during translation: the translation task crashed");
                TranslationResult::fallback(&self.text, source_lang, target_lang)
            }
        }
    }
}

/// Per-user chat state: language selection, transcript, error notices.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub source_lang: Language,
    pub target_lang: Language,
    reply_prefix: String,
    transcript: Vec<ChatMessage>,
    notices: Vec<String>,
}

impl ChatSession {
    pub fn new(source_lang: Language, target_lang: Language, reply_prefix: String) -> Self {
        ChatSession {
            source_lang,
            target_lang,
            reply_prefix,
            transcript: vec![],
            notices: vec![],
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        ChatSession::new(cfg.source_lang, cfg.target_lang, cfg.reply_prefix.clone())
    }

    pub fn swap_languages(&mut self) {
        std::mem::swap(&mut self.source_lang, &mut self.target_lang);
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Notices raised by the latest request.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn push_notice(&mut self, notice: String) {
        self.notices.push(notice);
    }

    /// Records the user's line and returns what needs translating.
    /// Empty input is ignored. Notices from the previous request are dropped.
    pub fn begin(&mut self, input: &str) -> Option<PendingTranslation> {
        if input.is_empty() {
            return None;
        }
        self.notices.clear();
        self.push(Role::User, input.to_owned());
        Some(PendingTranslation {
            text: input.to_owned(),
            source_lang: self.source_lang,
            target_lang: self.target_lang,
        })
    }

    /// Records the assistant's reply for a finished translation.
    pub fn complete(&mut self, result: &TranslationResult) -> &ChatMessage {
        let reply = self.format_reply(result);
        self.push(Role::Assistant, reply)
    }

    /// [`Self::begin`], translate, [`Self::complete`] in one go.
    pub async fn submit<T: TranslationService>(
        &mut self,
        translator: &T,
        input: &str,
    ) -> Option<&ChatMessage> {
        let pending = self.begin(input)?;
        let result = translator
            .translate(
                &pending.text,
                pending.source_lang.name(),
                pending.target_lang.name(),
            )
            .await;
        Some(self.complete(&result))
    }

    pub fn format_reply(&self, result: &TranslationResult) -> String {
        format!("{}{}", self.reply_prefix, result.translated_text)
    }

    fn push(&mut self, role: Role, content: String) -> &ChatMessage {
        self.transcript.push(ChatMessage {
            role,
            content,
            timestamp: Local::now(),
        });
        &self.transcript[self.transcript.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::dummy::{DummyLLM, DummyReply};
    use crate::{FALLBACK_TRANSLATION, LlmTranslationService};
    use std::sync::{Arc, Mutex};

    struct CrashingTranslator;

    impl TranslationService for CrashingTranslator {
        async fn translate(&self, _text: &str, _src: &str, _dst: &str) -> TranslationResult {
            panic!("translator blew up")
        }
    }

    fn perro() -> TranslationResult {
        TranslationResult {
            source_language: "English".to_owned(),
            target_language: "Spanish".to_owned(),
            translated_text: "perro".to_owned(),
            original_text: "dog".to_owned(),
        }
    }

    fn session() -> ChatSession {
        ChatSession::new(Language::English, Language::Spanish, "Translation: ".to_owned())
    }

    fn service(reply: DummyReply) -> LlmTranslationService<DummyLLM, fn(&str)> {
        LlmTranslationService::new(DummyLLM::new(reply), None)
    }

    #[test]
    fn swap_exchanges_languages() {
        let mut s = session();
        s.swap_languages();
        assert_eq!(s.source_lang, Language::Spanish);
        assert_eq!(s.target_lang, Language::English);
    }

    #[test]
    fn empty_input_is_ignored() {
        let mut s = session();
        assert_eq!(s.begin(""), None);
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn begin_captures_current_selection() {
        let mut s = session();
        let pending = s.begin("dog").unwrap();
        s.swap_languages();

        assert_eq!(pending.source_lang, Language::English);
        assert_eq!(pending.target_lang, Language::Spanish);
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript()[0].role, Role::User);
        assert_eq!(s.transcript()[0].content, "dog");
    }

    #[tokio::test]
    async fn submit_appends_formatted_reply() {
        let svc = service(DummyReply::Translation(perro()));
        let mut s = session();

        let reply = s.submit(&svc, "dog").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Translation: perro");

        let roles: Vec<_> = s.transcript().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(
            svc.llm().prompts(),
            vec!["Translate from English to Spanish: dog".to_owned()]
        );
    }

    #[tokio::test]
    async fn failed_submit_shows_apology_and_one_notice() {
        let notices = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&notices);
        let svc = LlmTranslationService::new(
            DummyLLM::new(DummyReply::ConnectionFailure("dns lookup failed".to_owned())),
            Some(move |notice: &str| sink.lock().unwrap().push(notice.to_owned())),
        );
        let mut s = session();

        let reply = s.submit(&svc, "dog").await.unwrap().clone();
        assert_eq!(reply.content, format!("Translation: {FALLBACK_TRANSLATION}"));

        for notice in notices.lock().unwrap().drain(..) {
            s.push_notice(notice);
        }
        assert_eq!(s.notices().len(), 1);
        assert!(s.notices()[0].contains("dns lookup failed"));
    }

    #[tokio::test]
    async fn empty_submit_makes_no_remote_call() {
        let svc = service(DummyReply::Raw("unused".to_owned()));
        let mut s = session();

        assert!(s.submit(&svc, "").await.is_none());
        assert!(svc.llm().prompts().is_empty());
        assert!(s.transcript().is_empty());
    }

    #[tokio::test]
    async fn notice_is_gone_after_next_successful_request() {
        let notices = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&notices);
        let failing = LlmTranslationService::new(
            DummyLLM::new(DummyReply::ApiFailure("quota exceeded".to_owned())),
            Some(move |notice: &str| sink.lock().unwrap().push(notice.to_owned())),
        );
        let working = service(DummyReply::Translation(perro()));
        let mut s = session();

        s.submit(&failing, "dog").await;
        for notice in notices.lock().unwrap().drain(..) {
            s.push_notice(notice);
        }
        assert_eq!(s.notices().len(), 1);

        let reply = s.submit(&working, "dog").await.unwrap();
        assert_eq!(reply.content, "Translation: perro");
        assert!(s.notices().is_empty());
        assert_eq!(s.transcript().len(), 4);
    }

    #[test]
    fn empty_input_keeps_current_notice() {
        let mut s = session();
        s.push_notice("Error during translation: boom".to_owned());
        assert_eq!(s.begin(""), None);
        assert_eq!(s.notices().len(), 1);
    }

    #[test]
    fn crashed_translation_becomes_fallback_with_notice() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut s = session();
        let pending = s.begin("dog").unwrap();

        let notices = Mutex::new(vec![]);
        let result = pending.run_blocking(runtime.handle(), &CrashingTranslator, |notice| {
            notices.lock().unwrap().push(notice.to_owned())
        });

        assert_eq!(result, TranslationResult::fallback("dog", "English", "Spanish"));
        let notices = notices.into_inner().unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].starts_with("Error during translation:"));
    }

    #[test]
    fn blocking_run_passes_result_through() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let svc = service(DummyReply::Translation(perro()));
        let mut s = session();
        let pending = s.begin("dog").unwrap();

        let result = pending.run_blocking(runtime.handle(), &svc, |notice| {
            panic!("unexpected notice: {notice}")
        });
        assert_eq!(result, perro());
    }
}
