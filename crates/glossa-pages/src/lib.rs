//! Page graph, dynamic pagination and rendering for glossa sites.
//!
//! Turns a directory of page templates and a directory of translation files
//! into a build graph of output paths, renders each output with its language's
//! translations, and streams provider-supplied pages in batches.

pub mod builder;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod graph;
pub mod paths;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod scan;
pub mod templates;

pub use builder::{BuildConfig, BuildResult, SiteBuilder};
pub use config::{DynamicOptions, LanguageOptions, PagesOptions, PipelineConfig, TranslateFactory};
pub use dynamic::{
    ArtifactId, ArtifactRequest, Content, ContentProvider, DynamicPage, DynamicPageProducer,
    DynamicState, PaginationState, ProviderReply,
};
pub use error::{PagesError, ProviderError, Result};
pub use graph::{BuildGraph, DynamicPageId, EntrySource, GraphEntry};
pub use paths::{normalize_base, normalize_url, OutputNaming, OutputPath, PathResolver};
pub use pipeline::{Pipeline, ResolvedId, MODULE_PRELOAD_POLYFILL};
pub use provider::FileBatchProvider;
pub use render::{RenderDispatcher, Translations};
pub use scan::scan;
pub use templates::{CompiledTemplate, TemplateCache, TemplateKey, TemplateOptions};
