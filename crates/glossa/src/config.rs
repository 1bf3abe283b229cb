//! Configuration file structure (glossa.toml).
//!
//! Relative paths are resolved against the directory holding the config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glossa_i18n::{Fallback, TranslationFormat, TranslatorOptions};
use glossa_pages::{
    BuildConfig, DynamicOptions, FileBatchProvider, LanguageOptions, PagesOptions, PipelineConfig,
    TemplateOptions,
};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pages: PagesConfig,
    languages: Option<LanguagesConfig>,
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    templates: TemplatesConfig,
    #[serde(default)]
    translation: TranslationConfig,
    #[serde(default)]
    dynamic: DynamicConfig,
    /// Values available to every template
    #[serde(default)]
    locals: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PagesConfig {
    #[serde(default = "default_pages_dir")]
    dir: String,
    #[serde(default = "default_extension")]
    extension: String,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            dir: default_pages_dir(),
            extension: default_extension(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LanguagesConfig {
    #[serde(default = "default_languages_dir")]
    dir: String,
    fallback: Option<Fallback>,
    #[serde(default)]
    format: TranslationFormat,
}

#[derive(Debug, Deserialize)]
struct OutputConfig {
    #[serde(default = "default_output")]
    dir: String,
    /// Sub-path every page is written under
    #[serde(default)]
    base: String,
    /// Public prefix the site is served from
    prefix: Option<String>,
    asset_file_names: Option<String>,
    chunk_file_names: Option<String>,
    /// Project root page imports resolve against
    root: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output(),
            base: String::new(),
            prefix: None,
            asset_file_names: None,
            chunk_file_names: None,
            root: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TemplatesConfig {
    include_dir: Option<String>,
    #[serde(default)]
    trim_blocks: bool,
    #[serde(default)]
    lstrip_blocks: bool,
    #[serde(default)]
    keep_trailing_newline: bool,
    #[serde(default = "default_auto_escape")]
    auto_escape: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            include_dir: None,
            trim_blocks: false,
            lstrip_blocks: false,
            keep_trailing_newline: false,
            auto_escape: default_auto_escape(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranslationConfig {
    #[serde(default = "default_key_separator")]
    key_separator: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            key_separator: default_key_separator(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct DynamicConfig {
    /// JSON or YAML file of page batches
    source: Option<String>,
    /// Template for pages that do not name one
    template: Option<String>,
}

fn default_pages_dir() -> String {
    "pages".to_string()
}
fn default_extension() -> String {
    "jinja".to_string()
}
fn default_languages_dir() -> String {
    "locales".to_string()
}
fn default_output() -> String {
    "dist".to_string()
}
fn default_auto_escape() -> bool {
    true
}
fn default_key_separator() -> String {
    ".".to_string()
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok(config);
    }
    tracing::debug!("No config at {}, using defaults", path.display());
    Ok(ConfigFile::default())
}

/// Directory relative config paths resolve against.
pub fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ConfigFile {
    /// Convert into a site build configuration. `output` overrides the configured directory.
    pub fn build_config(&self, base: &Path, output: Option<PathBuf>) -> BuildConfig {
        let pipeline = PipelineConfig {
            pages: PagesOptions {
                base_dir: base.join(&self.pages.dir),
                extension: self.pages.extension.clone(),
            },
            languages: self.languages.as_ref().map(|languages| LanguageOptions {
                base_dir: base.join(&languages.dir),
                fallback: languages.fallback.clone(),
                format: languages.format,
                translate_factory: None,
            }),
            locals: self
                .locals
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            template_options: TemplateOptions {
                include_dir: self.templates.include_dir.as_ref().map(|dir| base.join(dir)),
                trim_blocks: self.templates.trim_blocks,
                lstrip_blocks: self.templates.lstrip_blocks,
                keep_trailing_newline: self.templates.keep_trailing_newline,
                auto_escape: self.templates.auto_escape,
            },
            translation_options: TranslatorOptions {
                fallback: None,
                key_separator: self.translation.key_separator.clone(),
            },
            output_base_dir: self.output.base.clone(),
            public_prefix: self.output.prefix.clone(),
            asset_file_names: self.output.asset_file_names.clone(),
            chunk_file_names: self.output.chunk_file_names.clone(),
            dynamic: DynamicOptions {
                template: self.dynamic.template.as_ref().map(|t| base.join(t)),
            },
        };

        BuildConfig {
            pipeline,
            output_dir: output.unwrap_or_else(|| base.join(&self.output.dir)),
            root: self.output.root.as_ref().map(|root| base.join(root)),
        }
    }

    /// The content provider configured under `[dynamic]`, if any.
    pub fn provider(&self, base: &Path) -> Result<Option<FileBatchProvider>> {
        let Some(source) = &self.dynamic.source else {
            return Ok(None);
        };
        let path = base.join(source);
        let provider = FileBatchProvider::load(&path)
            .with_context(|| format!("Failed to load dynamic pages from {}", path.display()))?;
        tracing::info!("Loaded {} batches from {}", provider.len(), path.display());
        Ok(Some(provider))
    }
}
