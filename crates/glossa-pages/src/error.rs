//! Error types for page resolution and rendering.

use std::path::PathBuf;

use glossa_i18n::CatalogError;

use crate::paths::OutputPath;

/// Error returned by a content provider.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias using [`PagesError`].
pub type Result<T> = std::result::Result<T, PagesError>;

/// Errors that can occur while building or rendering a site.
#[derive(Debug, thiserror::Error)]
pub enum PagesError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to compile template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("Failed to render {output}: {source}")]
    Render {
        output: OutputPath,
        #[source]
        source: minijinja::Error,
    },

    #[error("Output {output} is produced by both {existing} and {incoming}")]
    Conflict {
        output: OutputPath,
        existing: String,
        incoming: String,
    },

    #[error("Page {path} is outside the pages directory {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Output base {base:?} must stay inside the output directory")]
    InvalidBase { base: String },

    #[error("Invalid page slug {slug:?}: {reason}")]
    InvalidSlug { slug: String, reason: &'static str },

    #[error("No template for dynamic page {slug}")]
    MissingTemplate { slug: String },

    #[error("Content provider failed on batch {batch}: {source}")]
    Provider {
        batch: usize,
        #[source]
        source: ProviderError,
    },

    #[error("Content provider protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("{failed} of {total} outputs failed to render")]
    Incomplete { failed: usize, total: usize },
}

impl PagesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
