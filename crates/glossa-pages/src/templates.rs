//! Compiled page templates and their cache.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use minijinja::{path_loader, AutoEscape, Environment, Value};

use crate::error::{PagesError, Result};
use crate::paths::OutputPath;

/// Template engine settings.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// Directory `{% include %}` and `{% extends %}` resolve against.
    /// Defaults to the pages directory.
    pub include_dir: Option<PathBuf>,

    /// Remove the first newline after a block tag
    pub trim_blocks: bool,

    /// Strip whitespace before a block tag on its line
    pub lstrip_blocks: bool,

    /// Keep the final newline of a template
    pub keep_trailing_newline: bool,

    /// HTML-escape interpolated values
    pub auto_escape: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            include_dir: None,
            trim_blocks: false,
            lstrip_blocks: false,
            keep_trailing_newline: false,
            auto_escape: true,
        }
    }
}

/// A template compiled into its own environment, ready to render.
pub struct CompiledTemplate {
    name: String,
    env: Environment<'static>,
}

impl CompiledTemplate {
    /// Read and compile a template file.
    pub fn compile_file(path: &Path, include_dir: &Path, options: &TemplateOptions) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| PagesError::io(path, e))?;
        Self::from_source(&path.display().to_string(), source, include_dir, options)
    }

    /// Compile template source. Syntax errors are reported here, not at render time.
    pub fn from_source(
        name: &str,
        source: String,
        include_dir: &Path,
        options: &TemplateOptions,
    ) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(options.trim_blocks);
        env.set_lstrip_blocks(options.lstrip_blocks);
        env.set_keep_trailing_newline(options.keep_trailing_newline);
        if options.auto_escape {
            env.set_auto_escape_callback(|_| AutoEscape::Html);
        } else {
            env.set_auto_escape_callback(|_| AutoEscape::None);
        }
        env.set_loader(path_loader(include_dir));

        env.add_template_owned(name.to_string(), source)
            .map_err(|source| PagesError::Template {
                path: name.to_string(),
                source,
            })?;

        Ok(Self {
            name: name.to_string(),
            env,
        })
    }

    /// Template name (its source path for files).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render with a context value.
    pub fn render(&self, context: Value) -> std::result::Result<String, minijinja::Error> {
        self.env.get_template(&self.name)?.render(context)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Cache key of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateKey {
    /// Static pages share one compilation per source file
    Source(PathBuf),
    /// Dynamic pages may pick different templates per batch, so they cache per output
    Output(OutputPath),
}

type Slot = Arc<Mutex<Option<Arc<CompiledTemplate>>>>;

/// Memoizes compiled templates by key.
///
/// Each key has its own slot, so a slow compile only blocks renders of the
/// same key.
#[derive(Debug, Default)]
pub struct TemplateCache {
    slots: RwLock<HashMap<TemplateKey, Slot>>,
}

impl TemplateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached template for `key`, compiling it on first use.
    ///
    /// `compile` runs at most once per key while it succeeds. Failures are
    /// returned to the caller and not cached, so the next call compiles again.
    pub fn get_or_compile<F>(&self, key: TemplateKey, compile: F) -> Result<Arc<CompiledTemplate>>
    where
        F: FnOnce() -> Result<CompiledTemplate>,
    {
        let slot = self.slot(key);
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(template) = slot.as_ref() {
            return Ok(Arc::clone(template));
        }

        let template = Arc::new(compile()?);
        tracing::debug!("Compiled template {}", template.name());
        *slot = Some(Arc::clone(&template));

        Ok(template)
    }

    fn slot(&self, key: TemplateKey) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
