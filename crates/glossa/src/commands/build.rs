//! Site build command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use glossa_pages::SiteBuilder;

use crate::config::{config_dir, load_config};

/// Run the build command.
pub async fn run(config_path: &Path, output: Option<PathBuf>) -> Result<()> {
    tracing::info!("Building site...");

    let file_config = load_config(config_path)?;
    let base = config_dir(config_path);

    let mut builder = SiteBuilder::new(file_config.build_config(&base, output));
    if let Some(provider) = file_config.provider(&base)? {
        builder = builder.with_provider(Box::new(provider));
    }

    let result = builder.build().await?;

    tracing::info!(
        "Built {} pages and {} dynamic pages in {}ms",
        result.pages,
        result.dynamic_pages,
        result.duration_ms
    );

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
