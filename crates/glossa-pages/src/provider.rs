//! Content providers backed by files.

use std::fs;
use std::path::Path;

use crate::dynamic::{ContentProvider, DynamicPage, ProviderReply};
use crate::error::{PagesError, ProviderError, Result};

/// Serves dynamic pages from a JSON or YAML file holding a list of batches.
///
/// ```json
/// [
///   [{ "slug": "blog/hello", "content": { "single": { "title": "Hello" } } }],
///   [{ "slug": "blog/later", "content": { "single": { "title": "Later" } } }]
/// ]
/// ```
///
/// Batch `i` of the file answers provider call `i`; past the last batch the
/// provider reports completion.
#[derive(Debug, Clone, Default)]
pub struct FileBatchProvider {
    batches: Vec<Vec<DynamicPage>>,
}

impl FileBatchProvider {
    /// Load batches from a file. `.yaml` and `.yml` files are read as YAML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PagesError::io(path, e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parsed = if ext == "yaml" || ext == "yml" {
            // serde_yaml only reads enums from `!tag` syntax, so go through a
            // JSON value to accept `content: {single: ...}` in both formats
            serde_yaml::from_str::<serde_json::Value>(&content)
                .map_err(|e| e.to_string())
                .and_then(|value| serde_json::from_value(value).map_err(|e| e.to_string()))
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        let batches = parsed.map_err(|message| PagesError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(Self::from_batches(batches))
    }

    /// Serve the given batches.
    pub fn from_batches(batches: Vec<Vec<DynamicPage>>) -> Self {
        Self { batches }
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether there are no batches.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl ContentProvider for FileBatchProvider {
    fn fetch(&mut self, batch: usize) -> std::result::Result<ProviderReply, ProviderError> {
        Ok(match self.batches.get(batch) {
            Some(pages) => ProviderReply::resolved(pages.clone()),
            None => ProviderReply::Completed,
        })
    }
}
