//! Content store
//!
//! Resolves a navigation path to a content URL, fetches the document, builds a
//! [`Page`] and republishes it to every subscriber.
//!
//! Loads are sequenced: each call to [`ContentStore::load`] takes a number
//! when it is made, and a response is only published while its number is still
//! the latest one. A slow response for an older path is dropped instead of
//! replacing the page of a newer one.
//!
//! Subscribers are not replayed the current page on subscribe; use
//! [`ContentStore::current_page`] for that.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::Page;
use crate::config::ClientConfig;
use crate::fetch::{Fetch, FetchError};
use crate::host::{Host, HostSignal};

/// Errors raised while loading content
#[derive(Error, Debug)]
pub enum ContentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Content at {url} is not a JSON object")]
    NotADocument { url: String },
}

/// Notification delivered to store subscribers
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A new page was published
    Page(Arc<Page>),
    /// The latest load failed; the store stays usable
    Failed { url: String, message: String },
}

/// Token returned by [`ContentStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    current: Option<Arc<Page>>,
    subscribers: Vec<(SubscriptionId, Handler)>,
    next_subscriber: u64,
    ready_sent: bool,
    error_sent: bool,
}

struct Shared {
    config: ClientConfig,
    fetcher: Arc<dyn Fetch>,
    host: Arc<dyn Host>,
    /// Number of the most recent load request
    requested: AtomicU64,
    state: Mutex<StoreState>,
    /// Serializes staleness checks with delivery so subscribers see pages in request order
    delivery: Mutex<()>,
}

/// Shared handle to the content store
#[derive(Clone)]
pub struct ContentStore {
    shared: Arc<Shared>,
}

impl ContentStore {
    pub fn new(config: ClientConfig, fetcher: Arc<dyn Fetch>, host: Arc<dyn Host>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                fetcher,
                host,
                requested: AtomicU64::new(0),
                state: Mutex::new(StoreState::default()),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Load the page at `path`, or the front page when `path` is absent or empty
    ///
    /// The request is numbered when this is called, so the returned future
    /// may be spawned or awaited later without changing which request counts
    /// as the latest. Resolves to `Ok(None)` when a newer load superseded
    /// this one; failures are logged and notified before being returned.
    pub fn load(
        &self,
        path: Option<&str>,
    ) -> impl Future<Output = Result<Option<Arc<Page>>, ContentError>> + Send + 'static {
        let seq = self.shared.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let path = match path {
            Some(p) if !p.is_empty() => p,
            _ => self.shared.config.front_page.as_str(),
        };
        let url = self.shared.config.content_url(path);
        let shared = Arc::clone(&self.shared);

        async move { shared.run_load(seq, url).await }
    }

    /// Register a handler for pages published from now on
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let mut state = self.shared.lock_state();
        let id = SubscriptionId(state.next_subscriber);
        state.next_subscriber += 1;
        state.subscribers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.shared.lock_state();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        state.subscribers.len() != before
    }

    /// The most recently published page
    pub fn current_page(&self) -> Option<Arc<Page>> {
        self.shared.lock_state().current.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl Shared {
    async fn run_load(&self, seq: u64, url: String) -> Result<Option<Arc<Page>>, ContentError> {
        tracing::debug!("Loading content #{} from {}", seq, url);

        match self.fetch_page(seq, &url).await {
            Ok(page) => Ok(self.publish(page)),
            Err(e) => {
                if self.fail(seq, &url, &e) {
                    Err(e)
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn fetch_page(&self, seq: u64, url: &str) -> Result<Page, ContentError> {
        let document = self.fetcher.get_json(url).await?;
        if !document.is_object() {
            return Err(ContentError::NotADocument {
                url: url.to_string(),
            });
        }
        Ok(Page::from_document(
            document,
            &self.config.default_template,
            url,
            seq,
        ))
    }

    fn is_latest(&self, seq: u64) -> bool {
        self.requested.load(Ordering::SeqCst) == seq
    }

    fn publish(&self, page: Page) -> Option<Arc<Page>> {
        let _delivery = lock(&self.delivery);
        if !self.is_latest(page.seq()) {
            tracing::debug!(
                "Dropping stale content #{} from {}, a newer load was requested",
                page.seq(),
                page.url()
            );
            return None;
        }

        if let Some(heading) = page.heading() {
            tracing::info!("Setting heading from content \"{}\"", heading);
            self.host.set_title(heading);
        }
        if page.has_own_template() {
            tracing::info!("Setting template from content {}", page.template());
        } else {
            tracing::info!("Using default template {}", page.template());
        }

        let page = Arc::new(page);
        let (handlers, first) = {
            let mut state = self.lock_state();
            state.current = Some(Arc::clone(&page));
            let first = !state.ready_sent;
            state.ready_sent = true;
            (handlers(&state), first)
        };

        let event = StoreEvent::Page(Arc::clone(&page));
        for handler in &handlers {
            handler(&event);
        }
        if first {
            self.host.signal(HostSignal::AppReady);
        }
        Some(page)
    }

    /// Report a failed load; returns false when the load was already superseded
    fn fail(&self, seq: u64, url: &str, error: &ContentError) -> bool {
        let _delivery = lock(&self.delivery);
        if !self.is_latest(seq) {
            tracing::debug!("Ignoring failure of superseded load #{}: {}", seq, error);
            return false;
        }

        tracing::error!("Error getting page at {}: {}", url, error);

        let (handlers, signal_error) = {
            let mut state = self.lock_state();
            let initial = seq == 1 && !state.ready_sent && !state.error_sent;
            if initial {
                state.error_sent = true;
            }
            (handlers(&state), initial)
        };

        let event = StoreEvent::Failed {
            url: url.to_string(),
            message: error.to_string(),
        };
        for handler in &handlers {
            handler(&event);
        }
        if signal_error {
            self.host.signal(HostSignal::AppError);
        }
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        lock(&self.state)
    }
}

fn handlers(state: &StoreState) -> Vec<Handler> {
    state
        .subscribers
        .iter()
        .map(|(_, h)| Arc::clone(h))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockFetcher;
    use crate::host::Document;
    use serde_json::json;

    const API: &str = "http://localhost:9090/kontentsu/api/files/";

    fn store(fetcher: &MockFetcher) -> (ContentStore, Arc<Document>) {
        let doc = Arc::new(Document::new());
        let store = ContentStore::new(
            ClientConfig::default(),
            Arc::new(fetcher.clone()),
            doc.clone(),
        );
        (store, doc)
    }

    fn recorder(store: &ContentStore) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |event| {
            let entry = match event {
                StoreEvent::Page(page) => page.url().to_string(),
                StoreEvent::Failed { url, .. } => format!("failed:{}", url),
            };
            sink.lock().unwrap().push(entry);
        });
        seen
    }

    #[tokio::test]
    async fn test_load_without_path_fetches_front_page() {
        let fetcher = MockFetcher::new();
        let url = format!("{}pages/page-simple/", API);
        fetcher.json(&url, json!({ "content": {} }));
        let (store, _) = store(&fetcher);

        let page = store.load(None).await.unwrap().unwrap();
        assert_eq!(fetcher.requests(), vec![url.clone()]);
        assert_eq!(page.url(), url);

        // an empty path also means the front page
        store.load(Some("")).await.unwrap();
        assert_eq!(fetcher.requests()[1], url);
    }

    #[tokio::test]
    async fn test_heading_and_template_from_document() {
        let fetcher = MockFetcher::new();
        fetcher.json(
            &format!("{}pages/a/", API),
            json!({ "content": { "heading": "X" }, "template": { "href": "T" } }),
        );
        let (store, doc) = store(&fetcher);

        let page = store.load(Some("pages/a/")).await.unwrap().unwrap();
        assert_eq!(page.template(), "T");
        assert_eq!(doc.title().as_deref(), Some("X"));
        assert_eq!(store.current_page(), Some(page));
    }

    #[tokio::test]
    async fn test_missing_template_uses_configured_default() {
        let fetcher = MockFetcher::new();
        fetcher.json(&format!("{}pages/a/", API), json!({ "content": {} }));
        let (store, doc) = store(&fetcher);

        let page = store.load(Some("pages/a/")).await.unwrap().unwrap();
        assert_eq!(page.template(), ClientConfig::default().default_template);
        assert_eq!(doc.title(), None);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_pages_without_replay() {
        let fetcher = MockFetcher::new();
        fetcher.json(&format!("{}pages/a/", API), json!({}));
        fetcher.json(&format!("{}pages/b/", API), json!({}));
        let (store, _) = store(&fetcher);

        let first = recorder(&store);
        let second = recorder(&store);
        store.load(Some("pages/a/")).await.unwrap();

        let late = recorder(&store);
        store.load(Some("pages/b/")).await.unwrap();

        let a = format!("{}pages/a/", API);
        let b = format!("{}pages/b/", API);
        assert_eq!(*first.lock().unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(*second.lock().unwrap(), vec![a, b.clone()]);
        assert_eq!(*late.lock().unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let fetcher = MockFetcher::new();
        fetcher.json(&format!("{}pages/a/", API), json!({}));
        let (store, _) = store(&fetcher);

        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(move |_| *sink.lock().unwrap() += 1);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));

        store.load(Some("pages/a/")).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_notified_and_store_stays_usable() {
        let fetcher = MockFetcher::new();
        fetcher.status(&format!("{}pages/broken/", API), 500);
        fetcher.json(&format!("{}pages/ok/", API), json!({}));
        let (store, doc) = store(&fetcher);
        let seen = recorder(&store);

        let err = store.load(Some("pages/broken/")).await.unwrap_err();
        assert!(matches!(err, ContentError::Fetch(FetchError::Status { status: 500, .. })));

        // a fresh load still succeeds after a failure
        let page = store.load(Some("pages/ok/")).await.unwrap();
        assert!(page.is_some());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                format!("failed:{}pages/broken/", API),
                format!("{}pages/ok/", API)
            ]
        );
        assert_eq!(doc.signals(), vec![HostSignal::AppError, HostSignal::AppReady]);
    }

    #[tokio::test]
    async fn test_non_object_document_is_a_failure() {
        let fetcher = MockFetcher::new();
        fetcher.json(&format!("{}pages/list/", API), json!(["not", "a", "page"]));
        let (store, _) = store(&fetcher);

        let err = store.load(Some("pages/list/")).await.unwrap_err();
        assert!(matches!(err, ContentError::NotADocument { .. }));
        assert!(store.current_page().is_none());
    }

    #[tokio::test]
    async fn test_signals_fire_at_most_once() {
        let fetcher = MockFetcher::new();
        fetcher.json(&format!("{}pages/a/", API), json!({}));
        fetcher.status(&format!("{}pages/gone/", API), 404);
        let (store, doc) = store(&fetcher);

        store.load(Some("pages/a/")).await.unwrap();
        store.load(Some("pages/a/")).await.unwrap();
        // later failures are logged but never reach the host as apperror
        assert!(store.load(Some("pages/gone/")).await.is_err());

        assert_eq!(doc.signals(), vec![HostSignal::AppReady]);
    }

    #[tokio::test]
    async fn test_apperror_only_for_initial_load() {
        let fetcher = MockFetcher::new();
        fetcher.status(&format!("{}pages/gone/", API), 404);
        let (store, doc) = store(&fetcher);

        assert!(store.load(Some("pages/gone/")).await.is_err());
        assert!(store.load(Some("pages/gone/")).await.is_err());
        assert_eq!(doc.signals(), vec![HostSignal::AppError]);
    }

    /// Regression guard: a slow response for an older path must never
    /// replace the page of a newer request.
    #[tokio::test]
    async fn test_stale_response_is_dropped() {
        let fetcher = MockFetcher::new();
        let x = format!("{}x/", API);
        let y = format!("{}y/", API);
        fetcher.json(&x, json!({ "content": { "heading": "X" } }));
        fetcher.json(&y, json!({ "content": { "heading": "Y" } }));
        let gate = fetcher.hold(&x);
        let (store, doc) = store(&fetcher);
        let seen = recorder(&store);

        let slow = tokio::spawn(store.load(Some("x/")));
        let fast = store.load(Some("y/"));

        let y_page = fast.await.unwrap().unwrap();
        gate.notify_one();
        let x_result = slow.await.unwrap().unwrap();

        assert!(x_result.is_none());
        assert_eq!(store.current_page(), Some(y_page));
        assert_eq!(*seen.lock().unwrap(), vec![y]);
        assert_eq!(doc.title().as_deref(), Some("Y"));
    }

    /// Regression guard: a superseded load that fails is not reported.
    #[tokio::test]
    async fn test_stale_failure_is_ignored() {
        let fetcher = MockFetcher::new();
        let x = format!("{}x/", API);
        fetcher.status(&x, 503);
        fetcher.json(&format!("{}y/", API), json!({}));
        let gate = fetcher.hold(&x);
        let (store, doc) = store(&fetcher);
        let seen = recorder(&store);

        let slow = tokio::spawn(store.load(Some("x/")));
        store.load(Some("y/")).await.unwrap();
        gate.notify_one();

        assert!(slow.await.unwrap().unwrap().is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(doc.signals(), vec![HostSignal::AppReady]);
    }

    fn nested_sections(levels: usize) -> String {
        let mut doc = String::from(r#"{"paragraphs":["leaf"]}"#);
        for _ in 0..levels {
            doc = format!(r#"{{"sections":[{}]}}"#, doc);
        }
        doc
    }

    #[tokio::test]
    async fn test_deeply_nested_document_loads_and_renders() {
        let fetcher = MockFetcher::new();
        fetcher.text(&format!("{}deep/", API), &nested_sections(200));
        let (store, _) = store(&fetcher);

        let page = store.load(Some("deep/")).await.unwrap().unwrap();
        let html = crate::render::ContentTree::new().render(page.data());
        assert_eq!(html.matches("<section>").count(), 200);
        assert!(html.contains("<p>leaf</p>"));
    }

    #[tokio::test]
    async fn test_document_past_depth_bound_fails_load() {
        let fetcher = MockFetcher::new();
        fetcher.text(&format!("{}abyss/", API), &nested_sections(1_000));
        let (store, _) = store(&fetcher);
        let seen = recorder(&store);

        let err = store.load(Some("abyss/")).await.unwrap_err();
        assert!(matches!(
            err,
            ContentError::Fetch(FetchError::TooDeep { .. })
        ));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![format!("failed:{}abyss/", API)]
        );
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_failed_load() {
        use crate::fetch::HttpFetcher;
        use axum::{routing::get, Router};
        use std::time::Duration;

        let app = Router::new().route(
            "/api/slow/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "{}"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let config = ClientConfig {
            files_api: format!("http://{}/api/", addr),
            ..ClientConfig::default()
        };
        let fetcher = HttpFetcher::new(Duration::from_millis(100)).unwrap();
        let doc = Arc::new(Document::new());
        let store = ContentStore::new(config, Arc::new(fetcher), doc.clone());
        let seen = recorder(&store);

        let err = store.load(Some("slow/")).await.unwrap_err();
        assert!(matches!(err, ContentError::Fetch(FetchError::Timeout { .. })));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![format!("failed:http://{}/api/slow/", addr)]
        );
        assert_eq!(doc.signals(), vec![crate::host::HostSignal::AppError]);
    }
}
