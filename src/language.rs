use std::fmt::Display;
use std::str::FromStr;

/// Languages offered for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Chinese,
    Japanese,
    Russian,
    Arabic,
    Hindi,
    Urdu,
    Portuguese,
    Italian,
    Dutch,
    Korean,
    Turkish,
    Swedish,
    Polish,
}

impl Language {
    pub const ALL: [Language; 17] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Chinese,
        Language::Japanese,
        Language::Russian,
        Language::Arabic,
        Language::Hindi,
        Language::Urdu,
        Language::Portuguese,
        Language::Italian,
        Language::Dutch,
        Language::Korean,
        Language::Turkish,
        Language::Swedish,
        Language::Polish,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Chinese => "Chinese",
            Language::Japanese => "Japanese",
            Language::Russian => "Russian",
            Language::Arabic => "Arabic",
            Language::Hindi => "Hindi",
            Language::Urdu => "Urdu",
            Language::Portuguese => "Portuguese",
            Language::Italian => "Italian",
            Language::Dutch => "Dutch",
            Language::Korean => "Korean",
            Language::Turkish => "Turkish",
            Language::Swedish => "Swedish",
            Language::Polish => "Polish",
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLanguage(pub String);

impl Display for UnsupportedLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unsupported language \"{}\". Supported languages: {:?}",
            self.0,
            Language::ALL.map(Language::name)
        )
    }
}

impl std::error::Error for UnsupportedLanguage {}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Language::ALL
            .into_iter()
            .find(|lang| lang.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedLanguage(s.to_owned()))
    }
}

impl TryFrom<String> for Language {
    type Error = UnsupportedLanguage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
