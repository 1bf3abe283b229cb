//! Print the build graph a host would receive.

use std::path::Path;

use anyhow::{Context, Result};
use glossa_pages::Pipeline;

use crate::config::{config_dir, load_config};

/// Run the graph command.
pub async fn run(config_path: &Path) -> Result<()> {
    let file_config = load_config(config_path)?;
    let base = config_dir(config_path);
    let config = file_config.build_config(&base, None);

    let pipeline = Pipeline::setup(config.pipeline)?;

    let graph = serde_json::json!({
        "inputs": pipeline.inputs(),
        "naming": pipeline.naming(),
        "languages": pipeline.languages(),
    });
    let output = serde_json::to_string_pretty(&graph).context("Failed to serialize graph")?;
    println!("{output}");

    Ok(())
}
