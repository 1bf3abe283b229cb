//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use glossa_i18n::{Fallback, Translate, TranslationFormat, TranslatorOptions};
use serde_json::{Map, Value};

use crate::templates::TemplateOptions;

/// Builds the translation lookup for a language, replacing the translator's own.
pub type TranslateFactory = Arc<dyn Fn(&str) -> Translate + Send + Sync>;

/// Where page templates live.
#[derive(Debug, Clone)]
pub struct PagesOptions {
    /// Directory scanned for page templates
    pub base_dir: PathBuf,

    /// Template file extension, without the dot
    pub extension: String,
}

impl Default for PagesOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("pages"),
            extension: "jinja".to_string(),
        }
    }
}

/// Where translations live and how they are looked up.
#[derive(Clone, Default)]
pub struct LanguageOptions {
    /// Directory holding one translation file per language
    pub base_dir: PathBuf,

    /// Fallback languages, overriding `PipelineConfig::translation_options`
    pub fallback: Option<Fallback>,

    /// Translation file format
    pub format: TranslationFormat,

    /// Custom translation lookup used instead of the translator
    pub translate_factory: Option<TranslateFactory>,
}

impl fmt::Debug for LanguageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageOptions")
            .field("base_dir", &self.base_dir)
            .field("fallback", &self.fallback)
            .field("format", &self.format)
            .field("translate_factory", &self.translate_factory.is_some())
            .finish()
    }
}

/// Settings for provider-supplied pages.
#[derive(Debug, Clone, Default)]
pub struct DynamicOptions {
    /// Template for dynamic pages that do not name their own.
    ///
    /// When it lives under the pages directory it is left out of the static pages.
    pub template: Option<PathBuf>,
}

/// Everything a [`Pipeline`](crate::Pipeline) needs at setup.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub pages: PagesOptions,

    /// Translations. `None` builds one output per page with no language segment.
    pub languages: Option<LanguageOptions>,

    /// Values merged into every render context
    pub locals: Map<String, Value>,

    pub template_options: TemplateOptions,

    pub translation_options: TranslatorOptions,

    /// Sub-path every output lives under
    pub output_base_dir: String,

    /// Public prefix the site is served from, when it differs from the output base
    pub public_prefix: Option<String>,

    /// Asset file name pattern, relative to the output base
    pub asset_file_names: Option<String>,

    /// Script chunk file name pattern, relative to the output base
    pub chunk_file_names: Option<String>,

    pub dynamic: DynamicOptions,
}
