//! Dynamic pages pulled batch by batch from a content provider.
//!
//! The producer asks its [`ContentProvider`] for the next batch only when the
//! host demands an output that is not registered yet. Every page of a batch is
//! registered once per language and queued as an artifact request for the host.
//!
//! ```text
//!   Idle ──demand──▶ AwaitingProvider ──Resolved──▶ BatchReady ──drain──▶ Draining
//!                      │    ▲                           │                   │
//!                      │    └──────────demand───────────┴───────────────────┘
//!                      └──Completed / empty batch──▶ Exhausted
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use glossa_i18n::LanguageCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PagesError, ProviderError, Result};
use crate::graph::{BuildGraph, DynamicPageId, EntrySource, GraphEntry};
use crate::paths::{OutputPath, PathResolver};

/// Content of a dynamic page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    /// One value for every batch
    Single(Value),
    /// One value per pagination batch, indexed by batch number
    Paged(Vec<Value>),
}

impl Content {
    /// The value rendered for a page registered in `batch`.
    pub fn for_batch(&self, batch: usize) -> Option<&Value> {
        match self {
            Self::Single(value) => Some(value),
            Self::Paged(values) => values.get(batch),
        }
    }
}

/// A page supplied by a content provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPage {
    /// Output location relative to the language root, e.g. `blog/hello`
    pub slug: String,

    /// Template overriding the default dynamic template
    #[serde(default)]
    pub template: Option<std::path::PathBuf>,

    pub content: Content,
}

impl DynamicPage {
    /// Create a page rendered with the default dynamic template.
    pub fn new(slug: impl Into<String>, content: Content) -> Self {
        Self {
            slug: slug.into(),
            template: None,
            content,
        }
    }

    /// Render this page with a specific template.
    pub fn with_template(mut self, template: impl Into<std::path::PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// A provider's answer for one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply {
    /// Pages of this batch. `next_index` overrides the index the following
    /// batch continues from; the next batch requested is `next_index + 1`.
    Resolved {
        pages: Vec<DynamicPage>,
        next_index: Option<usize>,
    },
    /// There is no more data.
    Completed,
}

impl ProviderReply {
    /// A batch continuing at the following index.
    pub fn resolved(pages: Vec<DynamicPage>) -> Self {
        Self::Resolved {
            pages,
            next_index: None,
        }
    }
}

/// Supplies dynamic pages on demand, one batch per call.
pub trait ContentProvider: Send {
    /// Fetch the pages of `batch`.
    fn fetch(&mut self, batch: usize) -> std::result::Result<ProviderReply, ProviderError>;
}

impl<F> ContentProvider for F
where
    F: FnMut(usize) -> std::result::Result<ProviderReply, ProviderError> + Send,
{
    fn fetch(&mut self, batch: usize) -> std::result::Result<ProviderReply, ProviderError> {
        self(batch)
    }
}

/// Where the producer is in the pagination protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicState {
    /// Nothing requested yet
    #[default]
    Idle,
    /// The provider has been asked for a batch and has not answered
    AwaitingProvider,
    /// A batch was registered and its artifact requests are queued
    BatchReady,
    /// The host took the artifact requests of the last batch
    Draining,
    /// The provider reported the end of its data
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Demand,
    Answered { exhausted: bool },
    Failed { previous: DynamicState },
    Drained,
}

impl DynamicState {
    fn on(self, event: Event) -> Result<Self> {
        use DynamicState::*;

        match (self, event) {
            (Idle | BatchReady | Draining, Event::Demand) => Ok(AwaitingProvider),
            (AwaitingProvider, Event::Demand) => Err(PagesError::ProtocolViolation(
                "content requested while the provider still owes a batch".to_string(),
            )),
            (AwaitingProvider, Event::Answered { exhausted: false }) => Ok(BatchReady),
            (AwaitingProvider, Event::Answered { exhausted: true }) => Ok(Exhausted),
            (AwaitingProvider, Event::Failed { previous }) => Ok(previous),
            (BatchReady, Event::Drained) => Ok(Draining),
            (state, Event::Drained) => Ok(state),
            (state, event) => Err(PagesError::ProtocolViolation(format!(
                "{event:?} is not valid in state {state:?}"
            ))),
        }
    }
}

/// Batch bookkeeping of the pagination protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaginationState {
    /// Index the next provider call receives
    pub current_batch_index: usize,
    /// True while the provider has been called and has not answered
    pub awaiting_batch: bool,
}

/// Identifies one dynamic artifact: a page in one language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactId {
    pub page: DynamicPageId,
    pub language: Option<LanguageCode>,
}

/// A request for the host to materialize one dynamic artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRequest {
    pub id: ArtifactId,
    pub file_name: OutputPath,
}

/// Pulls dynamic pages from a provider and registers them as graph entries.
pub struct DynamicPageProducer {
    provider: Box<dyn ContentProvider>,
    languages: Option<Vec<LanguageCode>>,
    state: DynamicState,
    pagination: PaginationState,
    fetched: BTreeSet<usize>,
    pages: BTreeMap<DynamicPageId, DynamicPage>,
    entries: BuildGraph,
    pending: Vec<ArtifactRequest>,
    emitted: HashSet<ArtifactId>,
}

impl DynamicPageProducer {
    /// Create a producer. With `languages` set, every page is registered once per language.
    pub fn new(provider: Box<dyn ContentProvider>, languages: Option<Vec<LanguageCode>>) -> Self {
        Self {
            provider,
            languages,
            state: DynamicState::default(),
            pagination: PaginationState::default(),
            fetched: BTreeSet::new(),
            pages: BTreeMap::new(),
            entries: BuildGraph::new(),
            pending: Vec::new(),
            emitted: HashSet::new(),
        }
    }

    pub fn state(&self) -> DynamicState {
        self.state
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    /// Whether the provider has signalled the end of its data.
    pub fn is_exhausted(&self) -> bool {
        self.state == DynamicState::Exhausted
    }

    /// Entries registered so far.
    pub fn entries(&self) -> &BuildGraph {
        &self.entries
    }

    /// A registered page.
    pub fn page(&self, id: DynamicPageId) -> Option<&DynamicPage> {
        self.pages.get(&id)
    }

    /// Look up `output`, pulling batches until it is registered or the provider is exhausted.
    pub fn demand(
        &mut self,
        output: &str,
        statics: &BuildGraph,
        resolver: &PathResolver,
    ) -> Result<Option<&GraphEntry>> {
        loop {
            if self.entries.contains(output) {
                return Ok(self.entries.get(output));
            }
            if !self.pull(statics, resolver)? {
                return Ok(None);
            }
        }
    }

    /// Ask the provider for the next batch.
    ///
    /// Returns `false` once the provider is exhausted; it is never called again after that.
    pub fn pull(&mut self, statics: &BuildGraph, resolver: &PathResolver) -> Result<bool> {
        if self.is_exhausted() {
            return Ok(false);
        }

        let previous = self.state;
        self.state = self.state.on(Event::Demand)?;
        self.pagination.awaiting_batch = true;

        let batch = self.pagination.current_batch_index;
        tracing::debug!("Requesting dynamic batch {batch}");

        let reply = match self.provider.fetch(batch) {
            Ok(reply) => reply,
            Err(source) => {
                self.state = self.state.on(Event::Failed { previous })?;
                self.pagination.awaiting_batch = false;
                return Err(PagesError::Provider { batch, source });
            }
        };

        self.pagination.awaiting_batch = false;
        self.fetched.insert(batch);

        let (pages, next_index) = match reply {
            ProviderReply::Resolved { pages, next_index } if !pages.is_empty() => {
                (pages, next_index)
            }
            _ => {
                tracing::info!("Dynamic pages complete after {} batches", self.fetched.len());
                self.state = self.state.on(Event::Answered { exhausted: true })?;
                return Ok(false);
            }
        };

        let Some(next) = next_index.unwrap_or(batch).checked_add(1) else {
            return Err(self.violation(format!(
                "batch {batch} continues past the largest batch index"
            )));
        };
        if self.fetched.contains(&next) {
            return Err(self.violation(format!(
                "batch {batch} continues at batch {next}, which was already fetched"
            )));
        }

        if let Err(e) = self.register(batch, pages, statics, resolver) {
            self.state = self.state.on(Event::Answered { exhausted: true })?;
            return Err(e);
        }

        self.pagination.current_batch_index = next;
        self.state = self.state.on(Event::Answered { exhausted: false })?;

        Ok(true)
    }

    /// Take the artifact requests queued since the last call.
    pub fn drain_artifacts(&mut self) -> Vec<ArtifactRequest> {
        // Draining is valid in every state
        self.state = self.state.on(Event::Drained).unwrap_or(self.state);
        std::mem::take(&mut self.pending)
    }

    fn register(
        &mut self,
        batch: usize,
        pages: Vec<DynamicPage>,
        statics: &BuildGraph,
        resolver: &PathResolver,
    ) -> Result<()> {
        let languages: Vec<Option<&str>> = match &self.languages {
            Some(languages) => languages.iter().map(|l| Some(l.as_str())).collect(),
            None => vec![None],
        };

        // Validate the whole batch before committing any of it
        let mut staged = BuildGraph::new();
        for (index, page) in pages.iter().enumerate() {
            let id = DynamicPageId { batch, index };
            for language in &languages {
                let output = resolver.dynamic_output_path(&page.slug, *language)?;
                let entry = GraphEntry {
                    output,
                    source: EntrySource::Dynamic { id },
                    language: language.map(str::to_string),
                };

                let taken = statics
                    .get(entry.output.as_str())
                    .or_else(|| self.entries.get(entry.output.as_str()));
                if let Some(existing) = taken {
                    return Err(PagesError::Conflict {
                        output: entry.output.clone(),
                        existing: existing.describe(),
                        incoming: entry.describe(),
                    });
                }
                staged.insert(entry)?;
            }
        }

        let mut staged: Vec<GraphEntry> = staged.entries().cloned().collect();
        staged.sort_by(|a, b| a.output.cmp(&b.output));

        for entry in staged {
            let EntrySource::Dynamic { id } = entry.source else {
                continue;
            };
            let artifact = ArtifactId {
                page: id,
                language: entry.language.clone(),
            };

            if self.emitted.insert(artifact.clone()) {
                self.pending.push(ArtifactRequest {
                    id: artifact,
                    file_name: entry.output.clone(),
                });
            }
            self.entries.insert(entry)?;
        }

        let count = pages.len();
        for (index, page) in pages.into_iter().enumerate() {
            self.pages.insert(DynamicPageId { batch, index }, page);
        }

        tracing::info!("Registered {count} dynamic pages from batch {batch}");

        Ok(())
    }

    fn violation(&mut self, message: String) -> PagesError {
        tracing::warn!("Content provider protocol violation: {message}");
        self.state = DynamicState::Exhausted;
        PagesError::ProtocolViolation(message)
    }
}

impl std::fmt::Debug for DynamicPageProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPageProducer")
            .field("state", &self.state)
            .field("pagination", &self.pagination)
            .field("pages", &self.pages.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Reply = std::result::Result<ProviderReply, ProviderError>;

    fn resolver() -> PathResolver {
        PathResolver::new("/site/pages", "", None)
    }

    fn page(slug: &str) -> DynamicPage {
        DynamicPage::new(slug, Content::Single(json!({ "title": slug })))
    }

    fn languages() -> Option<Vec<LanguageCode>> {
        Some(vec!["en".to_string(), "de".to_string()])
    }

    /// Provider that answers from a fixed list of batches and counts its calls.
    fn scripted(batches: Vec<ProviderReply>, calls: Arc<AtomicUsize>) -> Box<dyn ContentProvider> {
        Box::new(move |batch: usize| -> Reply {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(batches.get(batch).cloned().unwrap_or(ProviderReply::Completed))
        })
    }

    #[test]
    fn stops_after_empty_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = scripted(
            vec![
                ProviderReply::resolved(vec![page("a"), page("b")]),
                ProviderReply::resolved(vec![]),
            ],
            Arc::clone(&calls),
        );
        let mut producer = DynamicPageProducer::new(provider, languages());
        let statics = BuildGraph::new();
        let resolver = resolver();

        let mut artifacts = Vec::new();
        loop {
            let drained = producer.drain_artifacts();
            if drained.is_empty() {
                if !producer.pull(&statics, &resolver).unwrap() {
                    break;
                }
                continue;
            }
            artifacts.extend(drained);
        }

        assert_eq!(artifacts.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(producer.is_exhausted());

        // Further pulls never reach the provider
        assert!(!producer.pull(&statics, &resolver).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn emits_one_artifact_per_page_and_language() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = scripted(
            vec![ProviderReply::resolved(vec![page("blog/a"), page("blog/b")])],
            calls,
        );
        let mut producer = DynamicPageProducer::new(provider, languages());

        assert!(producer.pull(&BuildGraph::new(), &resolver()).unwrap());
        let mut files: Vec<String> = producer
            .drain_artifacts()
            .into_iter()
            .map(|a| a.file_name.to_string())
            .collect();
        files.sort();

        assert_eq!(
            files,
            vec!["de/blog/a.html", "de/blog/b.html", "en/blog/a.html", "en/blog/b.html"]
        );
        assert_eq!(producer.state(), DynamicState::Draining);
        assert!(producer.drain_artifacts().is_empty());
    }

    #[test]
    fn tracks_state_and_batch_index() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = scripted(vec![ProviderReply::resolved(vec![page("a")])], calls);
        let mut producer = DynamicPageProducer::new(provider, None);

        assert_eq!(producer.state(), DynamicState::Idle);
        assert_eq!(producer.pagination(), PaginationState::default());

        producer.pull(&BuildGraph::new(), &resolver()).unwrap();

        assert_eq!(producer.state(), DynamicState::BatchReady);
        assert_eq!(
            producer.pagination(),
            PaginationState {
                current_batch_index: 1,
                awaiting_batch: false
            }
        );
    }

    #[test]
    fn demand_pulls_until_output_is_registered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = scripted(
            vec![
                ProviderReply::resolved(vec![page("one")]),
                ProviderReply::resolved(vec![page("two")]),
                ProviderReply::resolved(vec![page("three")]),
            ],
            Arc::clone(&calls),
        );
        let mut producer = DynamicPageProducer::new(provider, None);
        let statics = BuildGraph::new();
        let resolver = resolver();

        let entry = producer
            .demand("two.html", &statics, &resolver)
            .unwrap()
            .cloned()
            .unwrap();

        assert_eq!(
            entry.source,
            EntrySource::Dynamic {
                id: DynamicPageId { batch: 1, index: 0 }
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(producer.demand("missing.html", &statics, &resolver).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn honours_next_index_override() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let provider = Box::new(move |batch: usize| -> Reply {
            log.lock().unwrap().push(batch);
            Ok(match batch {
                0 => ProviderReply::Resolved {
                    pages: vec![page("first")],
                    next_index: Some(4),
                },
                5 => ProviderReply::resolved(vec![page("sixth")]),
                _ => ProviderReply::Completed,
            })
        });
        let mut producer = DynamicPageProducer::new(provider, None);
        let statics = BuildGraph::new();
        let resolver = resolver();

        while producer.pull(&statics, &resolver).unwrap() {}

        assert_eq!(*seen.lock().unwrap(), vec![0, 5, 6]);
        assert!(producer.entries().contains("sixth.html"));
    }

    #[test]
    fn rejects_rewinding_to_fetched_batch() {
        let provider = Box::new(|batch: usize| -> Reply {
            Ok(ProviderReply::Resolved {
                pages: vec![page(&format!("p{batch}"))],
                next_index: Some(0),
            })
        });
        let mut producer = DynamicPageProducer::new(provider, None);
        let statics = BuildGraph::new();
        let resolver = resolver();

        // Batch 0 asks to continue at 1, which is fine
        assert!(producer.pull(&statics, &resolver).unwrap());
        // Batch 1 asks to continue at 1 again
        let result = producer.pull(&statics, &resolver);

        assert!(matches!(result, Err(PagesError::ProtocolViolation(_))));
        assert!(producer.is_exhausted());
        assert_eq!(producer.entries().len(), 1);
    }

    #[test]
    fn rejects_next_index_past_the_last_batch() {
        let provider = Box::new(|_batch: usize| -> Reply {
            Ok(ProviderReply::Resolved {
                pages: vec![page("x")],
                next_index: Some(usize::MAX),
            })
        });
        let mut producer = DynamicPageProducer::new(provider, None);

        let result = producer.pull(&BuildGraph::new(), &resolver());

        assert!(matches!(result, Err(PagesError::ProtocolViolation(_))));
        assert!(producer.is_exhausted());
        assert!(producer.entries().is_empty());
        assert!(!producer.pull(&BuildGraph::new(), &resolver()).unwrap());
    }

    #[test]
    fn provider_errors_propagate_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = Box::new(move |_batch: usize| -> Reply {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("backend unavailable".into())
        });
        let mut producer = DynamicPageProducer::new(provider, None);

        let result = producer.pull(&BuildGraph::new(), &resolver());

        assert!(matches!(result, Err(PagesError::Provider { batch: 0, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(producer.state(), DynamicState::Idle);
        assert!(!producer.pagination().awaiting_batch);
    }

    #[test]
    fn rejects_slugs_taken_by_static_pages() {
        let resolver = resolver();
        let statics = BuildGraph::build(
            &[PathBuf::from("/site/pages/about.jinja")],
            None,
            &resolver,
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = scripted(vec![ProviderReply::resolved(vec![page("about")])], calls);
        let mut producer = DynamicPageProducer::new(provider, None);

        let result = producer.pull(&statics, &resolver);

        assert!(matches!(result, Err(PagesError::Conflict { .. })));
        assert!(producer.entries().is_empty());
        assert!(producer.drain_artifacts().is_empty());
    }

    #[test]
    fn rejects_duplicate_slugs_within_a_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = scripted(
            vec![ProviderReply::resolved(vec![page("same"), page("same")])],
            calls,
        );
        let mut producer = DynamicPageProducer::new(provider, None);

        let result = producer.pull(&BuildGraph::new(), &resolver());

        assert!(matches!(result, Err(PagesError::Conflict { .. })));
        assert!(producer.entries().is_empty());
    }

    #[test]
    fn paged_content_is_indexed_by_batch() {
        let content = Content::Paged(vec![json!("first"), json!("second")]);

        assert_eq!(content.for_batch(1), Some(&json!("second")));
        assert_eq!(content.for_batch(2), None);
        assert_eq!(Content::Single(json!(1)).for_batch(9), Some(&json!(1)));
    }

    #[test]
    fn deserializes_tagged_content() {
        let page: DynamicPage = serde_json::from_value(json!({
            "slug": "news",
            "content": { "paged": [1, 2] }
        }))
        .unwrap();

        assert_eq!(page.content, Content::Paged(vec![json!(1), json!(2)]));
        assert!(page.template.is_none());
    }
}
