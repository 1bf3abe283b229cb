use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glossa_i18n::Translate;
use glossa_pages::{
    Content, DynamicPage, DynamicState, LanguageOptions, Pipeline, PipelineConfig, ProviderError,
    ProviderReply,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{tempdir, TempDir};

type Reply = Result<ProviderReply, ProviderError>;

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn site() -> TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(root, "pages/index.jinja", "{{ lang }}: {{ __('home.title') }}");
    write(root, "pages/about/team.jinja", "{{ __('team', {'count': 3}) }}");
    write(root, "layouts/post.jinja", "[{{ lang }}] {{ page.slug }} #{{ page.batch }}: {{ page.content.title }}");
    write(root, "locales/en.json", r#"{"home": {"title": "Home"}, "team": "{{count}} people"}"#);
    write(root, "locales/es.json", r#"{"home": {"title": "Inicio"}}"#);
    temp
}

fn config(temp: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.pages.base_dir = temp.path().join("pages");
    config.languages = Some(LanguageOptions {
        base_dir: temp.path().join("locales"),
        ..Default::default()
    });
    config.template_options.auto_escape = false;
    config.dynamic.template = Some(temp.path().join("layouts/post.jinja"));
    config
}

#[test]
fn renders_every_page_in_every_language() {
    let temp = site();

    let pipeline = Pipeline::setup(config(&temp)).unwrap();

    assert_eq!(pipeline.inputs().len(), 4);
    assert_eq!(pipeline.load("en/index.html").unwrap().as_deref(), Some("en: Home"));
    assert_eq!(pipeline.load("es/index.html").unwrap().as_deref(), Some("es: Inicio"));
    assert_eq!(
        pipeline.load("en/about/team.html").unwrap().as_deref(),
        Some("3 people")
    );
    // `es` has no `team` key and falls back to `en`, the first language
    assert_eq!(
        pipeline.load("es/about/team.html").unwrap().as_deref(),
        Some("3 people")
    );
}

#[test]
fn translate_factory_takes_precedence() {
    let temp = site();
    let mut config = config(&temp);
    if let Some(languages) = config.languages.as_mut() {
        languages.translate_factory = Some(Arc::new(|language: &str| -> Translate {
            let language = language.to_uppercase();
            Arc::new(move |key: &str| format!("{language}/{key}"))
        }));
    }

    let pipeline = Pipeline::setup(config).unwrap();

    assert_eq!(
        pipeline.load("es/index.html").unwrap().as_deref(),
        Some("es: ES/home.title")
    );
}

#[test]
fn pages_without_languages_only_see_locals() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "pages/index.jinja",
        "{{ title }}{% if translation is defined or lang is defined %} translated{% endif %}",
    );
    let mut config = PipelineConfig::default();
    config.pages.base_dir = temp.path().join("pages");
    config.locals.insert("title".to_string(), json!("x"));

    let pipeline = Pipeline::setup(config).unwrap();

    assert_eq!(
        pipeline.inputs().into_keys().collect::<Vec<_>>(),
        vec!["index.html"]
    );
    assert_eq!(pipeline.load("index.html").unwrap().as_deref(), Some("x"));
}

#[test]
fn paginates_dynamic_pages_per_language() {
    let temp = site();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = move |batch: usize| -> Reply {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(match batch {
            0 => ProviderReply::resolved(vec![
                DynamicPage::new("news/first", Content::Single(json!({ "title": "First" }))),
                DynamicPage::new(
                    "news/second",
                    Content::Paged(vec![json!({ "title": "Second" })]),
                ),
            ]),
            _ => ProviderReply::resolved(vec![]),
        })
    };

    let pipeline = Pipeline::setup(config(&temp))
        .unwrap()
        .with_provider(Box::new(provider));

    let mut files = Vec::new();
    loop {
        let artifacts = pipeline.drain_artifacts();
        if artifacts.is_empty() {
            if !pipeline.fetch_next_batch().unwrap() {
                break;
            }
            continue;
        }
        for artifact in artifacts {
            let html = pipeline.load(artifact.file_name.as_str()).unwrap().unwrap();
            files.push((artifact.file_name.to_string(), html));
        }
    }
    files.sort();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.dynamic_state(), Some(DynamicState::Exhausted));
    assert_eq!(
        files,
        vec![
            ("en/news/first.html".to_string(), "[en] news/first #0: First".to_string()),
            ("en/news/second.html".to_string(), "[en] news/second #0: Second".to_string()),
            ("es/news/first.html".to_string(), "[es] news/first #0: First".to_string()),
            ("es/news/second.html".to_string(), "[es] news/second #0: Second".to_string()),
        ]
    );

    // Static pages are unaffected by the dynamic ones
    assert_eq!(pipeline.load("en/index.html").unwrap().as_deref(), Some("en: Home"));
}
