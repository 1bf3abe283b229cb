//! The build graph: output paths and the jobs that produce them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use glossa_i18n::LanguageCode;
use serde::Serialize;

use crate::error::{PagesError, Result};
use crate::paths::{OutputPath, PathResolver};

/// Identifier of a dynamic page: the batch it arrived in and its position there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DynamicPageId {
    pub batch: usize,
    pub index: usize,
}

impl fmt::Display for DynamicPageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dynamic:{}:{}", self.batch, self.index)
    }
}

/// What produces a graph entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntrySource {
    /// A template discovered in the pages directory
    Static { path: PathBuf },
    /// A page supplied by a content provider
    Dynamic { id: DynamicPageId },
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { path } => write!(f, "{}", path.display()),
            Self::Dynamic { id } => write!(f, "{id}"),
        }
    }
}

/// One output path and the (source, language) pair rendering it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEntry {
    pub output: OutputPath,
    pub source: EntrySource,
    pub language: Option<LanguageCode>,
}

impl GraphEntry {
    /// Human-readable description of what produces this entry.
    pub fn describe(&self) -> String {
        match &self.language {
            Some(language) => format!("{} [{language}]", self.source),
            None => self.source.to_string(),
        }
    }
}

/// Output paths mapped to the entries producing them. Keys are unique.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    entries: HashMap<OutputPath, GraphEntry>,
}

impl BuildGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross every page with every language.
    ///
    /// With `languages` set, each page yields one entry per language. Without,
    /// each page yields a single entry.
    pub fn build(
        pages: &[PathBuf],
        languages: Option<&[LanguageCode]>,
        resolver: &PathResolver,
    ) -> Result<Self> {
        let mut graph = Self::new();

        for page in pages {
            match languages {
                Some(languages) => {
                    for language in languages {
                        graph.insert_static(page, Some(language), resolver)?;
                    }
                }
                None => graph.insert_static(page, None, resolver)?,
            }
        }

        Ok(graph)
    }

    fn insert_static(
        &mut self,
        page: &Path,
        language: Option<&LanguageCode>,
        resolver: &PathResolver,
    ) -> Result<()> {
        let output = resolver.output_path(page, language.map(String::as_str))?;
        self.insert(GraphEntry {
            output,
            source: EntrySource::Static {
                path: page.to_path_buf(),
            },
            language: language.cloned(),
        })
    }

    /// Add an entry. An output path that is already taken is a conflict.
    pub fn insert(&mut self, entry: GraphEntry) -> Result<()> {
        if let Some(existing) = self.entries.get(&entry.output) {
            return Err(PagesError::Conflict {
                output: entry.output.clone(),
                existing: existing.describe(),
                incoming: entry.describe(),
            });
        }

        self.entries.insert(entry.output.clone(), entry);
        Ok(())
    }

    /// Look up the entry for an output path.
    pub fn get(&self, output: &str) -> Option<&GraphEntry> {
        self.entries.get(output)
    }

    /// Check if an output path is taken.
    pub fn contains(&self, output: &str) -> bool {
        self.entries.contains_key(output)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the graph has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &GraphEntry> {
        self.entries.values()
    }

    /// Output paths in sorted order.
    pub fn outputs(&self) -> Vec<OutputPath> {
        let mut outputs: Vec<OutputPath> = self.entries.keys().cloned().collect();
        outputs.sort();
        outputs
    }

    /// The declared build inputs: every output path mapped to itself.
    pub fn inputs(&self) -> BTreeMap<String, String> {
        self.entries
            .keys()
            .map(|output| (output.to_string(), output.to_string()))
            .collect()
    }
}
