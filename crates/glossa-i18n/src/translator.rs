//! Translation lookup with fallback languages.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::{LanguageCatalog, LanguageCode};

/// A lookup function bound to one language: translation key in, text out.
pub type Translate = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Languages consulted when a key is missing from the requested language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFallback")]
pub enum Fallback {
    /// Never fall back.
    Disabled,
    /// One language for everything.
    One(LanguageCode),
    /// Languages tried in order.
    Chain(Vec<LanguageCode>),
    /// Per-language chains. The `default` key applies to languages without their own chain.
    PerLanguage(BTreeMap<String, Vec<LanguageCode>>),
}

impl Fallback {
    /// The fallback chain for one language.
    pub fn chain_for(&self, language: &str) -> &[LanguageCode] {
        match self {
            Self::Disabled => &[],
            Self::One(code) => std::slice::from_ref(code),
            Self::Chain(codes) => codes,
            Self::PerLanguage(map) => map
                .get(language)
                .or_else(|| map.get("default"))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFallback {
    Flag(bool),
    One(String),
    Chain(Vec<String>),
    PerLanguage(BTreeMap<String, Vec<String>>),
}

impl TryFrom<RawFallback> for Fallback {
    type Error = String;

    fn try_from(raw: RawFallback) -> Result<Self, Self::Error> {
        match raw {
            RawFallback::Flag(false) => Ok(Self::Disabled),
            RawFallback::Flag(true) => {
                Err("fallback must be false, a language code, a list or a table".to_string())
            }
            RawFallback::One(code) => Ok(Self::One(code)),
            RawFallback::Chain(codes) => Ok(Self::Chain(codes)),
            RawFallback::PerLanguage(map) => Ok(Self::PerLanguage(map)),
        }
    }
}

/// Options for initializing a [`Translator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorOptions {
    /// Fallback languages. `None` falls back to the first language of the catalog.
    pub fallback: Option<Fallback>,

    /// Separator for nested keys (`nav.home`).
    pub key_separator: String,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            fallback: None,
            key_separator: ".".to_string(),
        }
    }
}

/// Resolves translation keys against a [`LanguageCatalog`].
#[derive(Debug)]
pub struct Translator {
    resources: Arc<LanguageCatalog>,
    fallback: Fallback,
    key_separator: String,
}

impl Translator {
    /// Initialize a translator over a catalog.
    pub fn init(resources: Arc<LanguageCatalog>, options: TranslatorOptions) -> Self {
        let fallback = options.fallback.unwrap_or_else(|| {
            resources
                .codes()
                .into_iter()
                .next()
                .map_or(Fallback::Disabled, Fallback::One)
        });

        Self {
            resources,
            fallback,
            key_separator: options.key_separator,
        }
    }

    /// Languages this translator can serve.
    pub fn supported_languages(&self) -> Vec<LanguageCode> {
        self.resources.codes()
    }

    /// The fallback in effect.
    pub fn fallback(&self) -> &Fallback {
        &self.fallback
    }

    /// Translate `key` for `language`.
    ///
    /// Tries the language itself, then its fallback chain. A key found nowhere
    /// translates to itself.
    pub fn translate(&self, language: &str, key: &str) -> String {
        let chain = std::iter::once(language)
            .chain(self.fallback.chain_for(language).iter().map(String::as_str));

        for code in chain {
            if let Some(text) = self.lookup(code, key) {
                return text;
            }
        }

        tracing::debug!("Missing translation for {key} in {language}");
        key.to_string()
    }

    /// A lookup function fixed to one language.
    pub fn fixed_t(self: &Arc<Self>, language: &str) -> Translate {
        let translator = Arc::clone(self);
        let language = language.to_string();
        Arc::new(move |key: &str| translator.translate(&language, key))
    }

    fn lookup(&self, language: &str, key: &str) -> Option<String> {
        let dictionary = self.resources.get(language)?;

        let value = match dictionary.get(key) {
            Some(value) => value,
            None if self.key_separator.is_empty() => return None,
            None => {
                let mut parts = key.split(self.key_separator.as_str());
                let first = dictionary.get(parts.next()?)?;
                parts.try_fold(first, |value, part| value.get(part))?
            }
        };

        match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Replace `{{name}}` placeholders in `text` with values from `lookup`.
///
/// Placeholders without a value are left untouched.
pub fn interpolate<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([\w.-]+)\s*\}\}").expect("valid placeholder pattern"));

    re.replace_all(text, |caps: &Captures| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
