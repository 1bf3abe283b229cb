//! Scaffold a site in the current directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing glossa...");

    if config_path.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            config_path.display()
        );
        return Ok(());
    }

    let base = crate::config::config_dir(config_path);
    let pages_dir = base.join("pages");
    let locales_dir = base.join("locales");

    fs::create_dir_all(&pages_dir).context("Failed to create pages directory")?;
    fs::create_dir_all(&locales_dir).context("Failed to create locales directory")?;

    fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    tracing::info!("Created {}", config_path.display());

    let files = [
        (pages_dir.join("index.jinja"), DEFAULT_INDEX),
        (locales_dir.join("en.json"), DEFAULT_EN),
        (locales_dir.join("de.json"), DEFAULT_DE),
    ];

    for (path, content) in files {
        if !path.exists() || yes {
            fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Created {}", path.display());
        }
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'glossa build' to build the site.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Glossa Configuration

[pages]
# Directory scanned for page templates
dir = "pages"

# Template file extension
extension = "jinja"

[languages]
# One translation file per language, named by language code
dir = "locales"

# Languages consulted when a key is missing
fallback = "en"

[output]
# Output directory for the built site
dir = "dist"

# Sub-path pages are written under
base = ""

[locals]
site_name = "My Site"
"#;

const DEFAULT_INDEX: &str = r#"<!doctype html>
<html lang="{{ lang }}">
<head>
  <meta charset="utf-8">
  <title>{{ __('home.title') }} | {{ site_name }}</title>
</head>
<body>
  <nav>
    {% for code in languages %}<a href="{{ prefix(code ~ '/index.html') }}">{{ code }}</a> {% endfor %}
  </nav>
  <h1>{{ __('home.title') }}</h1>
  <p>{{ __('home.welcome', {'name': site_name}) }}</p>
</body>
</html>
"#;

const DEFAULT_EN: &str = r#"{
  "home": {
    "title": "Home",
    "welcome": "Welcome to {{name}}."
  }
}
"#;

const DEFAULT_DE: &str = r#"{
  "home": {
    "title": "Startseite",
    "welcome": "Willkommen bei {{name}}."
  }
}
"#;
