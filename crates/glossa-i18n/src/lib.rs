//! Translation catalogs for glossa sites.
//!
//! This crate loads one translation dictionary per language from a directory of
//! JSON or YAML files and provides fixed-language lookup functions with
//! fallback chains and `{{name}}` interpolation.

pub mod catalog;
pub mod translator;

pub use catalog::{CatalogError, LanguageCatalog, LanguageCode, TranslationDictionary, TranslationFormat};
pub use translator::{interpolate, Fallback, Translate, Translator, TranslatorOptions};
