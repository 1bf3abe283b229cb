//! Canonical output paths and public URLs.
//!
//! Output paths are always `/`-separated and relative to the output directory,
//! whatever the platform the pages were discovered on.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{PagesError, Result};

/// Extension of rendered pages.
pub const OUTPUT_EXTENSION: &str = "html";

/// Canonical identifier of one build artifact, e.g. `docs/de/about.html`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OutputPath(String);

impl OutputPath {
    /// Build an output path from `/`-separated segments.
    fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let joined = segments.into_iter().collect::<Vec<_>>().join("/");
        Self(normalize_segments(&joined))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for OutputPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for OutputPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<OutputPath> for String {
    fn from(path: OutputPath) -> Self {
        path.0
    }
}

/// Strip leading separators and convert a path to `/` form.
///
/// `\\site\\docs\\` becomes `site/docs/`.
pub fn normalize_base(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trailing = unified.ends_with('/');
    let normalized = normalize_segments(&unified);

    if trailing && !normalized.is_empty() {
        format!("{normalized}/")
    } else {
        normalized
    }
}

/// Collapse repeated separators in a URL without breaking `scheme://`.
///
/// Every run of `/` or `\` becomes a single `/`, except directly after the
/// first scheme colon. A `/` in front of a leading scheme is dropped, so
/// `/https://cdn.example.com//a` becomes `https://cdn.example.com/a`.
pub fn normalize_url(url: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    static LEADING_SCHEME: OnceLock<Regex> = OnceLock::new();
    static SCHEME: OnceLock<Regex> = OnceLock::new();

    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[/\\]+").expect("valid pattern"));
    let leading_scheme = LEADING_SCHEME
        .get_or_init(|| Regex::new(r"^/?([A-Za-z][A-Za-z0-9+.\-]+):/").expect("valid pattern"));
    let scheme = SCHEME
        .get_or_init(|| Regex::new(r"([A-Za-z][A-Za-z0-9+.\-]+):/").expect("valid pattern"));

    let collapsed = separators.replace_all(url, "/");

    if leading_scheme.is_match(&collapsed) {
        leading_scheme.replace(&collapsed, "$1://").into_owned()
    } else {
        scheme.replace(&collapsed, "$1://").into_owned()
    }
}

/// Resolve `.` and `..` segments and drop empty ones.
fn normalize_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." if segments.last().is_some_and(|s| *s != "..") => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Output naming handed to the host build system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputNaming {
    /// Public base the host should serve from
    pub base: String,
    /// File name pattern for emitted assets
    pub asset_file_names: String,
    /// File name pattern for emitted script chunks
    pub chunk_file_names: String,
}

/// Computes output paths and public URLs for a site.
#[derive(Debug, Clone)]
pub struct PathResolver {
    pages_root: PathBuf,
    base_path: String,
    prefix: Option<String>,
    source_extension: Option<String>,
}

impl PathResolver {
    /// Create a resolver.
    ///
    /// `pages_root` is the directory pages are discovered in, `output_base_dir`
    /// the sub-path every output lives under and `prefix` the public prefix the
    /// site is served from, if it differs from the output base.
    pub fn new(pages_root: impl Into<PathBuf>, output_base_dir: &str, prefix: Option<String>) -> Self {
        Self {
            pages_root: pages_root.into(),
            base_path: normalize_base(output_base_dir),
            prefix: prefix.filter(|p| !p.is_empty()),
            source_extension: None,
        }
    }

    /// Strip this whole extension from page file names, so `html.j2` maps
    /// `index.html.j2` to `index.html`.
    pub fn with_source_extension(mut self, extension: &str) -> Self {
        let extension = extension.trim_start_matches('.');
        self.source_extension = (!extension.is_empty()).then(|| extension.to_string());
        self
    }

    /// Normalized output base directory.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Directory pages are discovered in.
    pub fn pages_root(&self) -> &Path {
        &self.pages_root
    }

    /// Output path of a static page, optionally under a language segment.
    ///
    /// `pages/blog/post.jinja` with language `de` and base `site` becomes
    /// `site/de/blog/post.html`.
    pub fn output_path(&self, source: &Path, language: Option<&str>) -> Result<OutputPath> {
        let relative = source
            .strip_prefix(&self.pages_root)
            .map_err(|_| PagesError::OutsideRoot {
                path: source.to_path_buf(),
                root: self.pages_root.clone(),
            })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                _ => {
                    return Err(PagesError::OutsideRoot {
                        path: source.to_path_buf(),
                        root: self.pages_root.clone(),
                    })
                }
            }
        }

        let Some(file) = segments.pop() else {
            return Err(PagesError::OutsideRoot {
                path: source.to_path_buf(),
                root: self.pages_root.clone(),
            });
        };
        segments.push(self.output_file_name(&file));

        Ok(OutputPath::from_segments(
            [self.base_path.as_str()]
                .into_iter()
                .chain(language)
                .chain(segments.iter().map(String::as_str)),
        ))
    }

    fn output_file_name(&self, file: &str) -> String {
        let stem = self
            .source_extension
            .as_deref()
            .and_then(|ext| strip_extension(file, ext))
            .unwrap_or_else(|| {
                Path::new(file)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(file)
            });
        format!("{stem}.{OUTPUT_EXTENSION}")
    }

    /// Output path of a dynamic page, optionally under a language segment.
    ///
    /// `blog/hello` becomes `blog/hello.html`; a trailing slash, as in
    /// `blog/hello/`, becomes `blog/hello/index.html`.
    pub fn dynamic_output_path(&self, slug: &str, language: Option<&str>) -> Result<OutputPath> {
        let invalid = |reason| PagesError::InvalidSlug {
            slug: slug.to_string(),
            reason,
        };

        let unified = slug.replace('\\', "/");
        let trimmed = unified.trim_start_matches('/');

        if trimmed.trim_end_matches('/').is_empty() {
            return Err(invalid("slug is empty"));
        }
        if trimmed.split('/').any(|s| s == "..") {
            return Err(invalid("slug must not contain '..' segments"));
        }

        let file = if trimmed.ends_with('/') {
            format!("{trimmed}index.{OUTPUT_EXTENSION}")
        } else {
            format!("{trimmed}.{OUTPUT_EXTENSION}")
        };

        Ok(OutputPath::from_segments(
            [self.base_path.as_str()]
                .into_iter()
                .chain(language)
                .chain([file.as_str()]),
        ))
    }

    /// Public URL of `path`, rooted at the public prefix or else the output base.
    pub fn public_url(&self, path: &str) -> String {
        let root = self.prefix.as_deref().unwrap_or(&self.base_path);
        normalize_url(&format!("/{root}/{path}"))
    }

    /// Output naming for the host.
    ///
    /// Asset and chunk patterns live under the output base. The host base is the
    /// public prefix when one is set and no output base is configured.
    pub fn output_naming(
        &self,
        asset_file_names: Option<&str>,
        chunk_file_names: Option<&str>,
    ) -> OutputNaming {
        let base = match &self.prefix {
            Some(prefix) if self.base_path.is_empty() => prefix.clone(),
            _ => "/".to_string(),
        };

        let assets = asset_file_names.unwrap_or("assets/[name]-[hash][extname]");
        let chunks = chunk_file_names.unwrap_or("assets/[name]-[hash].js");

        OutputNaming {
            base,
            asset_file_names: normalize_base(&format!("{}/{}", self.base_path, assets)),
            chunk_file_names: normalize_base(&format!("{}/{}", self.base_path, chunks)),
        }
    }
}

/// Strip `.{extension}` from a file name, which may contain further dots.
///
/// Returns `None` when the name does not end in the extension or nothing
/// is left before it.
pub(crate) fn strip_extension<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    let extension = extension.trim_start_matches('.');
    file_name
        .strip_suffix(extension)?
        .strip_suffix('.')
        .filter(|stem| !stem.is_empty())
}
