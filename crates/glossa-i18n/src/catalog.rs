//! Language catalog loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;
use walkdir::WalkDir;

/// Identifier of a language, taken from the basename of its translation file.
pub type LanguageCode = String;

/// Parsed contents of one translation file. Key order follows the file.
pub type TranslationDictionary = serde_json::Map<String, serde_json::Value>;

/// File format of translation dictionaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationFormat {
    /// `*.json` files
    #[default]
    Json,
    /// `*.yaml` / `*.yml` files
    Yaml,
}

impl TranslationFormat {
    /// Whether a file belongs to this format, judged by its extension.
    pub fn matches(self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match self {
            Self::Json => ext == "json",
            Self::Yaml => ext == "yaml" || ext == "yml",
        }
    }

    fn parse(self, content: &str) -> Result<TranslationDictionary, String> {
        match self {
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Errors that can occur while loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan languages directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid translation file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Language {code} is defined by both {first} and {second}")]
    DuplicateLanguage {
        code: LanguageCode,
        first: PathBuf,
        second: PathBuf,
    },
}

/// All translation dictionaries of a site, keyed by language code.
#[derive(Debug, Clone, Default)]
pub struct LanguageCatalog {
    dictionaries: BTreeMap<LanguageCode, TranslationDictionary>,
}

impl LanguageCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every translation file under `dir`, recursively.
    ///
    /// Files are parsed in parallel. The language code of a file is its stem,
    /// so `locales/de.json` defines `de`.
    pub fn load(dir: &Path, format: TranslationFormat) -> Result<Self, CatalogError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|source| CatalogError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;

            if entry.file_type().is_file() && format.matches(entry.path()) {
                files.push(entry.into_path());
            }
        }

        let loaded: Vec<(LanguageCode, PathBuf, TranslationDictionary)> = files
            .into_par_iter()
            .map(|path| load_file(path, format))
            .collect::<Result<_, _>>()?;

        let mut sources: BTreeMap<LanguageCode, PathBuf> = BTreeMap::new();
        let mut catalog = Self::new();

        for (code, path, dictionary) in loaded {
            if let Some(first) = sources.get(&code) {
                return Err(CatalogError::DuplicateLanguage {
                    code,
                    first: first.clone(),
                    second: path,
                });
            }
            sources.insert(code.clone(), path);
            catalog.dictionaries.insert(code, dictionary);
        }

        tracing::debug!(
            "Loaded {} languages from {}",
            catalog.len(),
            dir.display()
        );

        Ok(catalog)
    }

    /// Build a catalog from already-parsed dictionaries.
    pub fn from_dictionaries<I>(dictionaries: I) -> Self
    where
        I: IntoIterator<Item = (LanguageCode, TranslationDictionary)>,
    {
        Self {
            dictionaries: dictionaries.into_iter().collect(),
        }
    }

    /// Language codes in sorted order.
    pub fn codes(&self) -> Vec<LanguageCode> {
        self.dictionaries.keys().cloned().collect()
    }

    /// Dictionary of a language.
    pub fn get(&self, code: &str) -> Option<&TranslationDictionary> {
        self.dictionaries.get(code)
    }

    /// Number of languages.
    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    /// Whether the catalog has no languages.
    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }
}

fn load_file(
    path: PathBuf,
    format: TranslationFormat,
) -> Result<(LanguageCode, PathBuf, TranslationDictionary), CatalogError> {
    let code = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let content = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;

    let dictionary = format
        .parse(&content)
        .map_err(|message| CatalogError::Parse {
            path: path.clone(),
            message,
        })?;

    Ok((code, path, dictionary))
}
