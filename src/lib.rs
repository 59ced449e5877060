//! kontentsu-client: renders Kontentsu content through server-supplied templates
//!
//! The client fetches a JSON content document for the current location,
//! fetches the template that document names, compiles it and mounts the
//! result. Content sections are rendered by a recursive [`render::ContentTree`].

pub mod commands;
pub mod config;
pub mod content;
pub mod fetch;
pub mod host;
pub mod navigation;
pub mod render;
pub mod server;
pub mod template;

use std::sync::Arc;

use config::ClientConfig;
use content::ContentStore;
use fetch::Fetch;
use host::Host;
use navigation::{NavigationListener, Navigator};
use render::ContentTree;
use template::{MountPoint, TemplateLoader};

/// The content client application
#[derive(Clone)]
pub struct Kontentsu {
    config: ClientConfig,
    store: ContentStore,
    mount: Arc<MountPoint>,
    loader: Arc<TemplateLoader>,
}

impl Kontentsu {
    /// Wire a client around `fetcher` rendering into `host`
    pub fn new(config: ClientConfig, fetcher: Arc<dyn Fetch>, host: Arc<dyn Host>) -> Self {
        let store = ContentStore::new(config.clone(), Arc::clone(&fetcher), host);
        let mount = Arc::new(MountPoint::new());
        let tree = Arc::new(ContentTree::with_builtin_delegates());
        let loader = Arc::new(TemplateLoader::new(
            config.clone(),
            fetcher,
            Arc::clone(&mount),
            tree,
        ));

        Self {
            config,
            store,
            mount,
            loader,
        }
    }

    /// Show published pages and start following navigation from `initial_location`
    pub fn start(&self, initial_location: &str) -> Navigator {
        self.loader.attach(&self.store);
        let (navigator, _listener) = NavigationListener::start(self.store.clone(), initial_location);
        tracing::debug!("Client started at {:?}", initial_location);
        navigator
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn mount(&self) -> &Arc<MountPoint> {
        &self.mount
    }

    pub fn loader(&self) -> &Arc<TemplateLoader> {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockFetcher;
    use crate::host::{Document, HostSignal};
    use serde_json::json;
    use std::time::Duration;

    const API: &str = "http://localhost:9090/kontentsu/api/files/";

    #[tokio::test]
    async fn test_start_renders_front_page_then_follows_navigation() {
        let fetcher = MockFetcher::new();
        fetcher.json(
            &format!("{}pages/page-simple/", API),
            json!({
                "content": { "heading": "Front" },
                "sections": [{ "paragraphs": ["Welcome"] }]
            }),
        );
        fetcher.json(
            &format!("{}pages/about/", API),
            json!({
                "content": { "heading": "About" },
                "template": { "href": "templates/plain.html" },
                "sections": [{ "image": { "href": "/me.png", "alt": "Me" } }]
            }),
        );
        fetcher.text(
            "http://localhost:9090/templates/responsive-one-article.tpl.html",
            "<main>{% render article page %}</main>",
        );
        fetcher.text(
            "http://localhost:9090/templates/plain.html",
            "{% render article page %}",
        );

        let doc = Arc::new(Document::new());
        let app = Kontentsu::new(ClientConfig::default(), Arc::new(fetcher.clone()), doc.clone());
        let mut views = app.mount().subscribe();

        let nav = app.start("/");
        tokio::time::timeout(Duration::from_secs(1), views.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            app.mount().current().unwrap().html,
            "<main><article><h1>Front</h1><section><p>Welcome</p></section></article></main>"
        );
        assert_eq!(doc.title().as_deref(), Some("Front"));
        assert_eq!(doc.signals(), vec![HostSignal::AppReady]);

        nav.navigate("/pages/about");
        tokio::time::timeout(Duration::from_secs(1), views.changed())
            .await
            .unwrap()
            .unwrap();
        let view = app.mount().current().unwrap();
        assert_eq!(view.template, "templates/plain.html");
        assert_eq!(
            view.html,
            "<article><h1>About</h1><section><figure><img src=\"/me.png\" alt=\"Me\"></figure></section></article>"
        );
        assert_eq!(doc.title().as_deref(), Some("About"));
    }

    #[tokio::test]
    async fn test_failed_initial_load_signals_error() {
        let fetcher = MockFetcher::new();
        let doc = Arc::new(Document::new());
        let app = Kontentsu::new(ClientConfig::default(), Arc::new(fetcher.clone()), doc.clone());

        let _nav = app.start("/pages/missing");
        for _ in 0..100 {
            if !doc.signals().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(doc.signals(), vec![HostSignal::AppError]);
        assert!(app.mount().current().is_none());
    }
}
