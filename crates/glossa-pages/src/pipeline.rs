//! The page pipeline: setup, id resolution and loading for a host build.
//!
//! A [`Pipeline`] owns every map it builds. Setup scans pages and loads
//! translations once; after that only the dynamic producer changes, behind a
//! lock owned by the pipeline, so several pipelines can live side by side.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glossa_i18n::{LanguageCatalog, LanguageCode, Translator};

use crate::config::PipelineConfig;
use crate::dynamic::{ArtifactRequest, ContentProvider, DynamicPageProducer, DynamicState};
use crate::error::{PagesError, Result};
use crate::graph::{BuildGraph, EntrySource};
use crate::paths::{OutputNaming, OutputPath, PathResolver, OUTPUT_EXTENSION};
use crate::render::{RenderDispatcher, Translations};
use crate::scan::scan;

/// Id of the host's module preload polyfill, which pages must not claim.
pub const MODULE_PRELOAD_POLYFILL: &str = "vite/modulepreload-polyfill";

/// What [`Pipeline::resolve_id`] claimed an id as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedId {
    /// An output of the build graph
    Output(OutputPath),
    /// A file imported by a page, resolved against the project root
    Asset(PathBuf),
}

/// Resolves, renders and paginates the pages of one site.
pub struct Pipeline {
    resolver: Arc<PathResolver>,
    languages: Option<Vec<LanguageCode>>,
    graph: BuildGraph,
    naming: OutputNaming,
    dispatcher: RenderDispatcher,
    producer: Option<Mutex<DynamicPageProducer>>,
    root: PathBuf,
}

impl Pipeline {
    /// Scan pages and load translations, then build the static graph.
    ///
    /// The page scan and the catalog load run concurrently. Any error here is fatal.
    pub fn setup(config: PipelineConfig) -> Result<Self> {
        let pages_dir = &config.pages.base_dir;
        let pages_root = pages_dir
            .canonicalize()
            .map_err(|e| PagesError::io(pages_dir, e))?;

        let (pages, catalog) = rayon::join(
            || scan(&pages_root, &config.pages.extension),
            || {
                config
                    .languages
                    .as_ref()
                    .map(|languages| LanguageCatalog::load(&languages.base_dir, languages.format))
                    .transpose()
            },
        );
        let mut pages = pages?;
        let catalog = catalog?.map(Arc::new);

        if let Some(template) = config
            .dynamic
            .template
            .as_ref()
            .and_then(|t| t.canonicalize().ok())
        {
            pages.retain(|page| {
                let keep = *page != template;
                if !keep {
                    tracing::debug!("Skipping dynamic template {} as a page", page.display());
                }
                keep
            });
        }

        let languages = catalog.as_ref().map(|catalog| catalog.codes());
        if languages.as_ref().is_some_and(Vec::is_empty) {
            tracing::warn!("Languages are configured but no translation files were found");
        }

        let translations = match (&config.languages, &catalog) {
            (Some(options), Some(catalog)) => {
                let mut translator_options = config.translation_options.clone();
                if options.fallback.is_some() {
                    translator_options.fallback = options.fallback.clone();
                }
                Some(Translations {
                    catalog: Arc::clone(catalog),
                    translator: Arc::new(Translator::init(Arc::clone(catalog), translator_options)),
                    factory: options.translate_factory.clone(),
                })
            }
            _ => None,
        };

        let resolver = Arc::new(
            PathResolver::new(
                &pages_root,
                &config.output_base_dir,
                config.public_prefix.clone(),
            )
            .with_source_extension(&config.pages.extension),
        );
        if resolver.base_path().split('/').any(|segment| segment == "..") {
            return Err(PagesError::InvalidBase {
                base: config.output_base_dir.clone(),
            });
        }
        let graph = BuildGraph::build(&pages, languages.as_deref(), &resolver)?;
        let naming = resolver.output_naming(
            config.asset_file_names.as_deref(),
            config.chunk_file_names.as_deref(),
        );

        tracing::info!(
            "Resolved {} outputs from {} pages in {} languages",
            graph.len(),
            pages.len(),
            languages.as_ref().map_or(0, Vec::len)
        );

        let dispatcher = RenderDispatcher::new(Arc::clone(&resolver), &config, translations);
        let root = std::env::current_dir().map_err(|e| PagesError::io(".", e))?;

        Ok(Self {
            resolver,
            languages,
            graph,
            naming,
            dispatcher,
            producer: None,
            root,
        })
    }

    /// Attach a content provider for dynamic pages.
    pub fn with_provider(mut self, provider: Box<dyn ContentProvider>) -> Self {
        self.producer = Some(Mutex::new(DynamicPageProducer::new(
            provider,
            self.languages.clone(),
        )));
        self
    }

    /// Build inputs declared to the host: every static output mapped to itself.
    pub fn inputs(&self) -> BTreeMap<String, String> {
        self.graph.inputs()
    }

    /// Output naming for the host.
    pub fn naming(&self) -> &OutputNaming {
        &self.naming
    }

    /// Capture the project root assets are resolved against.
    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    /// Project root assets are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The static build graph.
    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    /// Known language codes, `None` when no languages are configured.
    pub fn languages(&self) -> Option<&[LanguageCode]> {
        self.languages.as_deref()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Claim `id` for this pipeline, or decline it with `None`.
    ///
    /// Graph outputs are claimed as themselves. Ids imported from a page are
    /// resolved against the project root, except the module preload polyfill.
    pub fn resolve_id(&self, id: &str, importer: Option<&str>) -> Option<ResolvedId> {
        if let Some(output) = self.registered(id) {
            return Some(ResolvedId::Output(output));
        }

        let importer = importer?;
        if self.registered(importer).is_none() || id == MODULE_PRELOAD_POLYFILL {
            return None;
        }

        Some(ResolvedId::Asset(self.root.join(id.trim_start_matches('/'))))
    }

    /// Render the content of `id`.
    ///
    /// Static outputs render directly. Other page ids are demanded from the
    /// content provider, which may pull further batches. Returns `None` for ids
    /// this pipeline does not produce.
    pub fn load(&self, id: &str) -> Result<Option<String>> {
        if let Some(entry) = self.graph.get(id) {
            return self.dispatcher.render(entry, None).map(Some);
        }

        let Some(producer) = &self.producer else {
            return Ok(None);
        };
        if !id.ends_with(&format!(".{OUTPUT_EXTENSION}")) {
            return Ok(None);
        }

        let (entry, page) = {
            let mut producer = lock(producer);
            let Some(entry) = producer.demand(id, &self.graph, &self.resolver)?.cloned() else {
                return Ok(None);
            };
            let page = match entry.source {
                EntrySource::Dynamic { id } => producer.page(id).cloned(),
                EntrySource::Static { .. } => None,
            };
            (entry, page)
        };

        self.dispatcher.render(&entry, page.as_ref()).map(Some)
    }

    /// Pull one more batch from the content provider.
    ///
    /// Returns `false` when there is no provider or it is exhausted.
    pub fn fetch_next_batch(&self) -> Result<bool> {
        match &self.producer {
            Some(producer) => lock(producer).pull(&self.graph, &self.resolver),
            None => Ok(false),
        }
    }

    /// Take the dynamic artifact requests queued since the last call.
    pub fn drain_artifacts(&self) -> Vec<ArtifactRequest> {
        self.producer
            .as_ref()
            .map(|producer| lock(producer).drain_artifacts())
            .unwrap_or_default()
    }

    /// State of the dynamic producer, if a provider is attached.
    pub fn dynamic_state(&self) -> Option<DynamicState> {
        self.producer.as_ref().map(|producer| lock(producer).state())
    }

    fn registered(&self, id: &str) -> Option<OutputPath> {
        if let Some(entry) = self.graph.get(id) {
            return Some(entry.output.clone());
        }
        let producer = lock(self.producer.as_ref()?);
        producer.entries().get(id).map(|entry| entry.output.clone())
    }
}

fn lock(producer: &Mutex<DynamicPageProducer>) -> MutexGuard<'_, DynamicPageProducer> {
    producer.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver", &self.resolver)
            .field("languages", &self.languages)
            .field("outputs", &self.graph.len())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageOptions;
    use crate::dynamic::{Content, DynamicPage, ProviderReply};
    use crate::error::ProviderError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    type Reply = std::result::Result<ProviderReply, ProviderError>;

    fn site() -> TempDir {
        let temp = tempdir().unwrap();
        let pages = temp.path().join("pages");
        fs::create_dir_all(pages.join("blog")).unwrap();
        fs::write(pages.join("index.jinja"), "{{ __('title') }}").unwrap();
        fs::write(pages.join("blog/post.jinja"), "post").unwrap();
        fs::write(pages.join("post.jinja.bak"), "ignored").unwrap();

        let locales = temp.path().join("locales");
        fs::create_dir_all(&locales).unwrap();
        fs::write(locales.join("en.json"), r#"{"title": "Welcome"}"#).unwrap();
        fs::write(locales.join("fr.json"), r#"{"title": "Bienvenue"}"#).unwrap();
        temp
    }

    fn config(temp: &TempDir, languages: bool) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.pages.base_dir = temp.path().join("pages");
        if languages {
            config.languages = Some(LanguageOptions {
                base_dir: temp.path().join("locales"),
                ..Default::default()
            });
        }
        config
    }

    #[test]
    fn setup_crosses_pages_with_languages() {
        let temp = site();

        let pipeline = Pipeline::setup(config(&temp, true)).unwrap();

        assert_eq!(
            pipeline.inputs().into_keys().collect::<Vec<_>>(),
            vec![
                "en/blog/post.html",
                "en/index.html",
                "fr/blog/post.html",
                "fr/index.html"
            ]
        );
        assert_eq!(
            pipeline.languages(),
            Some(["en".to_string(), "fr".to_string()].as_slice())
        );
    }

    #[test]
    fn loads_static_pages_and_declines_unknown_ids() {
        let temp = site();
        let pipeline = Pipeline::setup(config(&temp, true)).unwrap();

        assert_eq!(
            pipeline.load("fr/index.html").unwrap().as_deref(),
            Some("Bienvenue")
        );
        assert_eq!(pipeline.load("de/index.html").unwrap(), None);
        assert_eq!(pipeline.load("style.css").unwrap(), None);
    }

    #[test]
    fn missing_pages_dir_is_fatal() {
        let temp = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.pages.base_dir = temp.path().join("nope");

        let result = Pipeline::setup(config);

        assert!(matches!(result, Err(PagesError::Io { .. })));
    }

    #[test]
    fn duplicate_language_codes_are_fatal() {
        let temp = site();
        fs::create_dir_all(temp.path().join("locales/extra")).unwrap();
        fs::write(temp.path().join("locales/extra/en.json"), "{}").unwrap();

        let result = Pipeline::setup(config(&temp, true));

        assert!(matches!(result, Err(PagesError::Catalog(_))));
    }

    #[test]
    fn configured_languages_without_files_yield_no_outputs() {
        let temp = site();
        let mut config = config(&temp, true);
        let empty = temp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        if let Some(languages) = config.languages.as_mut() {
            languages.base_dir = empty;
        }

        let pipeline = Pipeline::setup(config).unwrap();

        assert!(pipeline.inputs().is_empty());
    }

    #[test]
    fn resolves_outputs_and_page_imports() {
        let temp = site();
        let mut pipeline = Pipeline::setup(config(&temp, false)).unwrap();
        pipeline.set_root("/project");
        assert_eq!(pipeline.root(), Path::new("/project"));

        assert_eq!(
            pipeline.resolve_id("index.html", None),
            Some(ResolvedId::Output(
                pipeline.graph().get("index.html").unwrap().output.clone()
            ))
        );
        assert_eq!(
            pipeline.resolve_id("/src/main.js", Some("index.html")),
            Some(ResolvedId::Asset(PathBuf::from("/project/src/main.js")))
        );
        assert_eq!(
            pipeline.resolve_id(MODULE_PRELOAD_POLYFILL, Some("index.html")),
            None
        );
        assert_eq!(pipeline.resolve_id("/src/main.js", Some("other.js")), None);
        assert_eq!(pipeline.resolve_id("/src/main.js", None), None);
    }

    #[test]
    fn scans_multi_dot_page_extensions() {
        let temp = site();
        fs::write(temp.path().join("pages/about.html.j2"), "about").unwrap();
        let mut config = config(&temp, false);
        config.pages.extension = "html.j2".to_string();

        let pipeline = Pipeline::setup(config).unwrap();

        assert_eq!(
            pipeline.inputs().into_keys().collect::<Vec<_>>(),
            vec!["about.html"]
        );
        assert_eq!(pipeline.load("about.html").unwrap().as_deref(), Some("about"));
    }

    #[test]
    fn rejects_output_base_outside_output_dir() {
        let temp = site();
        let mut config = config(&temp, false);
        config.output_base_dir = "../escape".to_string();

        let result = Pipeline::setup(config);

        assert!(matches!(result, Err(PagesError::InvalidBase { .. })));
    }

    #[test]
    fn dynamic_template_is_not_a_static_page() {
        let temp = site();
        fs::write(temp.path().join("pages/_entry.jinja"), "{{ page.content }}").unwrap();
        let mut config = config(&temp, false);
        config.dynamic.template = Some(temp.path().join("pages/_entry.jinja"));

        let pipeline = Pipeline::setup(config).unwrap();

        assert_eq!(
            pipeline.inputs().into_keys().collect::<Vec<_>>(),
            vec!["blog/post.html", "index.html"]
        );
    }

    #[test]
    fn output_naming_follows_base_and_prefix() {
        let temp = site();
        let mut config = config(&temp, false);
        config.public_prefix = Some("/cdn/".to_string());
        config.chunk_file_names = Some("js/[name].js".to_string());

        let pipeline = Pipeline::setup(config).unwrap();

        assert_eq!(pipeline.naming().base, "/cdn/");
        assert_eq!(
            pipeline.naming().asset_file_names,
            "assets/[name]-[hash][extname]"
        );
        assert_eq!(pipeline.naming().chunk_file_names, "js/[name].js");
    }

    #[test]
    fn loads_dynamic_pages_on_demand() {
        let temp = site();
        fs::write(temp.path().join("pages/entry.html"), "{{ page.content }}").unwrap();
        let mut config = config(&temp, false);
        config.dynamic.template = Some(temp.path().join("pages/entry.html"));

        let provider = |batch: usize| -> Reply {
            Ok(match batch {
                0 => ProviderReply::resolved(vec![DynamicPage::new(
                    "news",
                    Content::Single(json!("fresh")),
                )]),
                _ => ProviderReply::Completed,
            })
        };
        let pipeline = Pipeline::setup(config)
            .unwrap()
            .with_provider(Box::new(provider));

        assert_eq!(pipeline.dynamic_state(), Some(DynamicState::Idle));
        assert_eq!(pipeline.load("news.html").unwrap().as_deref(), Some("fresh"));
        assert_eq!(pipeline.dynamic_state(), Some(DynamicState::BatchReady));
        assert_eq!(
            pipeline.resolve_id("news.html", None),
            Some(ResolvedId::Output(
                pipeline.resolver().dynamic_output_path("news", None).unwrap()
            ))
        );

        assert_eq!(pipeline.load("missing.html").unwrap(), None);
        assert_eq!(pipeline.dynamic_state(), Some(DynamicState::Exhausted));
        assert!(!pipeline.fetch_next_batch().unwrap());
    }
}
