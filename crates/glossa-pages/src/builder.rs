//! Site builder: materializes a pipeline's outputs on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::dynamic::ContentProvider;
use crate::error::{PagesError, Result};
use crate::paths::{OutputNaming, OutputPath};
use crate::pipeline::Pipeline;

/// Configuration for building a site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Page, language and render settings
    pub pipeline: PipelineConfig,

    /// Output directory
    pub output_dir: PathBuf,

    /// Project root imports resolve against. Defaults to the working directory.
    pub root: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            output_dir: PathBuf::from("dist"),
            root: None,
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of static pages written
    pub pages: usize,

    /// Number of dynamic pages written
    pub dynamic_pages: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,

    /// Asset naming handed to the host
    pub naming: OutputNaming,
}

/// Builds a site into its output directory.
pub struct SiteBuilder {
    config: BuildConfig,
    provider: Option<Box<dyn ContentProvider>>,
}

impl SiteBuilder {
    /// Create a new site builder.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Supply dynamic pages from a content provider.
    pub fn with_provider(mut self, provider: Box<dyn ContentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the site.
    ///
    /// Static pages render in parallel. Dynamic pages are then pulled batch by
    /// batch until the provider is exhausted. Pages that fail to render are
    /// logged and reported together once every other page is written.
    pub async fn build(self) -> Result<BuildResult> {
        let start = Instant::now();
        let output_dir = self.config.output_dir.clone();

        let mut pipeline = Pipeline::setup(self.config.pipeline)?;
        if let Some(root) = self.config.root {
            pipeline.set_root(root);
        }
        if let Some(provider) = self.provider {
            pipeline = pipeline.with_provider(provider);
        }

        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| PagesError::io(&output_dir, e))?;

        // Render static pages in parallel
        let outputs = pipeline.graph().outputs();
        let rendered: Vec<(OutputPath, Result<Option<String>>)> = outputs
            .into_par_iter()
            .map(|output| {
                let html = pipeline.load(output.as_str());
                (output, html)
            })
            .collect();

        let mut total = rendered.len();
        let mut failed = 0;
        let mut pages = 0;

        for (output, result) in rendered {
            match result {
                Ok(Some(html)) => {
                    write_output(&output_dir, &output, &html).await?;
                    pages += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("{}", e);
                    failed += 1;
                }
            }
        }

        // Pull dynamic pages until the provider runs dry
        let mut dynamic_pages = 0;
        loop {
            let artifacts = pipeline.drain_artifacts();
            if artifacts.is_empty() {
                if !pipeline.fetch_next_batch()? {
                    break;
                }
                continue;
            }

            total += artifacts.len();
            for artifact in artifacts {
                match pipeline.load(artifact.file_name.as_str()) {
                    Ok(Some(html)) => {
                        write_output(&output_dir, &artifact.file_name, &html).await?;
                        dynamic_pages += 1;
                    }
                    Ok(None) => {
                        tracing::warn!("No content for dynamic page {}", artifact.file_name);
                    }
                    Err(e) => {
                        tracing::error!("{}", e);
                        failed += 1;
                    }
                }
            }
        }

        if failed > 0 {
            return Err(PagesError::Incomplete { failed, total });
        }

        let duration = start.elapsed();
        tracing::info!(
            "Wrote {} pages and {} dynamic pages to {}",
            pages,
            dynamic_pages,
            output_dir.display()
        );

        Ok(BuildResult {
            pages,
            dynamic_pages,
            duration_ms: duration.as_millis() as u64,
            output_dir,
            naming: pipeline.naming().clone(),
        })
    }
}

impl std::fmt::Debug for SiteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteBuilder")
            .field("config", &self.config)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

async fn write_output(output_dir: &Path, output: &OutputPath, html: &str) -> Result<()> {
    let path = output_dir.join(output.as_str());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PagesError::io(parent, e))?;
    }
    tokio::fs::write(&path, html)
        .await
        .map_err(|e| PagesError::io(&path, e))
}
