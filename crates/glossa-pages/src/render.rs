//! Render context assembly and template dispatch.

use std::collections::BTreeMap;
use std::path::{Component, PathBuf};
use std::sync::Arc;

use glossa_i18n::{interpolate, LanguageCatalog, LanguageCode, Translate, Translator};
use minijinja::{context, Value};
use serde_json::Map;

use crate::config::{PipelineConfig, TranslateFactory};
use crate::dynamic::DynamicPage;
use crate::error::{PagesError, Result};
use crate::graph::{EntrySource, GraphEntry};
use crate::paths::PathResolver;
use crate::templates::{CompiledTemplate, TemplateCache, TemplateKey, TemplateOptions};

/// Translation sources for language-bearing entries.
#[derive(Clone)]
pub struct Translations {
    pub catalog: Arc<LanguageCatalog>,
    pub translator: Arc<Translator>,
    /// Replaces the translator's lookup when set
    pub factory: Option<TranslateFactory>,
}

impl Translations {
    fn lookup(&self, language: &str) -> Translate {
        match &self.factory {
            Some(factory) => factory(language),
            None => self.translator.fixed_t(language),
        }
    }
}

/// Renders graph entries with their templates and context.
pub struct RenderDispatcher {
    resolver: Arc<PathResolver>,
    translations: Option<Translations>,
    languages: Vec<LanguageCode>,
    locals: Map<String, serde_json::Value>,
    base: String,
    include_dir: PathBuf,
    options: TemplateOptions,
    dynamic_template: Option<PathBuf>,
    templates: TemplateCache,
}

impl RenderDispatcher {
    /// Create a dispatcher from the pipeline configuration.
    pub fn new(
        resolver: Arc<PathResolver>,
        config: &PipelineConfig,
        translations: Option<Translations>,
    ) -> Self {
        let include_dir = config
            .template_options
            .include_dir
            .clone()
            .unwrap_or_else(|| resolver.pages_root().to_path_buf());

        let languages = translations
            .as_ref()
            .map(|t| t.translator.supported_languages())
            .unwrap_or_default();

        Self {
            resolver,
            translations,
            languages,
            locals: config.locals.clone(),
            base: config.output_base_dir.clone(),
            include_dir,
            options: config.template_options.clone(),
            dynamic_template: config.dynamic.template.clone(),
            templates: TemplateCache::new(),
        }
    }

    /// Compiled templates held by the cache.
    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    /// Render one entry. Dynamic entries need the page registered for them.
    pub fn render(&self, entry: &GraphEntry, page: Option<&DynamicPage>) -> Result<String> {
        let template = match (&entry.source, page) {
            (EntrySource::Static { path }, _) => {
                self.templates
                    .get_or_compile(TemplateKey::Source(path.clone()), || {
                        CompiledTemplate::compile_file(path, &self.include_dir, &self.options)
                    })?
            }
            (EntrySource::Dynamic { .. }, Some(page)) => {
                let path = self.dynamic_template(page)?;
                self.templates
                    .get_or_compile(TemplateKey::Output(entry.output.clone()), || {
                        CompiledTemplate::compile_file(&path, &self.include_dir, &self.options)
                    })?
            }
            (EntrySource::Dynamic { id }, None) => {
                return Err(PagesError::ProtocolViolation(format!(
                    "no page registered for {id}"
                )))
            }
        };

        let context = self.context(entry, page)?;
        tracing::debug!("Rendering {} with {}", entry.output, template.name());

        template
            .render(context)
            .map_err(|source| PagesError::Render {
                output: entry.output.clone(),
                source,
            })
    }

    /// Page-level template override, resolved against the pages root, else the default.
    ///
    /// Overrides must be relative paths that stay inside the pages root.
    fn dynamic_template(&self, page: &DynamicPage) -> Result<PathBuf> {
        match (&page.template, &self.dynamic_template) {
            (Some(template), _) => {
                let root = self.resolver.pages_root();
                if !template
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
                {
                    return Err(PagesError::OutsideRoot {
                        path: template.clone(),
                        root: root.to_path_buf(),
                    });
                }
                Ok(root.join(template))
            }
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(PagesError::MissingTemplate {
                slug: page.slug.clone(),
            }),
        }
    }

    fn context(&self, entry: &GraphEntry, page: Option<&DynamicPage>) -> Result<Value> {
        let mut ctx: BTreeMap<String, Value> = BTreeMap::new();

        ctx.insert("base".to_string(), Value::from(self.base.clone()));
        let resolver = Arc::clone(&self.resolver);
        ctx.insert(
            "prefix".to_string(),
            Value::from_function(move |url: String| resolver.public_url(&url)),
        );

        if let (Some(language), Some(translations)) = (&entry.language, &self.translations) {
            let translate = translations.lookup(language);
            ctx.insert(
                "__".to_string(),
                Value::from_function(move |key: String, vars: Option<Value>| -> String {
                    let text = translate(&key);
                    match vars {
                        Some(vars) => interpolate(&text, |name| {
                            vars.get_attr(name)
                                .ok()
                                .filter(|v| !v.is_undefined() && !v.is_none())
                                .map(|v| v.to_string())
                        }),
                        None => text,
                    }
                }),
            );
            ctx.insert("lang".to_string(), Value::from(language.clone()));
            if let Some(dictionary) = translations.catalog.get(language) {
                ctx.insert("translation".to_string(), Value::from_serialize(dictionary));
            }
            ctx.insert(
                "languages".to_string(),
                Value::from_serialize(&self.languages),
            );
        }

        if let (EntrySource::Dynamic { id }, Some(page)) = (&entry.source, page) {
            let content = page.content.for_batch(id.batch).ok_or_else(|| {
                PagesError::ProtocolViolation(format!(
                    "page {} has no content for batch {}",
                    page.slug, id.batch
                ))
            })?;
            ctx.insert(
                "page".to_string(),
                context! {
                    slug => page.slug.clone(),
                    content => Value::from_serialize(content),
                    batch => id.batch,
                },
            );
        }

        // Locals win on collision
        for (key, value) in &self.locals {
            ctx.insert(key.clone(), Value::from_serialize(value));
        }

        Ok(Value::from_iter(ctx))
    }
}

impl std::fmt::Debug for RenderDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDispatcher")
            .field("languages", &self.languages)
            .field("base", &self.base)
            .field("include_dir", &self.include_dir)
            .field("templates", &self.templates.len())
            .finish_non_exhaustive()
    }
}
