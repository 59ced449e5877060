//! Navigation listener

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{normalize_path, NavigationEvent};
use crate::content::ContentStore;

/// Sending side of the navigation channel, held by the host
#[derive(Clone)]
pub struct Navigator {
    tx: mpsc::UnboundedSender<NavigationEvent>,
    location: Arc<Mutex<String>>,
}

impl Navigator {
    /// Signal a location change; returns false once the listener has stopped
    pub fn navigate(&self, path: impl Into<String>) -> bool {
        let event = NavigationEvent::new(path);
        *self.location.lock().unwrap_or_else(|e| e.into_inner()) = event.path.clone();
        self.tx.send(event).is_ok()
    }

    /// The location most recently navigated to
    pub fn location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Drives content loads from host navigation events
pub struct NavigationListener;

impl NavigationListener {
    /// Load the page for `initial_location`, then follow navigation events
    ///
    /// Every event starts its own load so a slow fetch never holds back a
    /// newer navigation; the content store keeps only the latest result.
    /// The listener stops when every [`Navigator`] has been dropped.
    pub fn start(store: ContentStore, initial_location: &str) -> (Navigator, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let navigator = Navigator {
            tx,
            location: Arc::new(Mutex::new(initial_location.to_string())),
        };

        let initial = normalize_path(initial_location);
        tracing::debug!(
            "Initial location {:?} -> {}",
            initial_location,
            initial.as_deref().unwrap_or("front page")
        );
        tokio::spawn(store.load(initial.as_deref()));

        let handle = tokio::spawn(Self::run(store, rx));
        (navigator, handle)
    }

    async fn run(store: ContentStore, mut rx: mpsc::UnboundedReceiver<NavigationEvent>) {
        while let Some(event) = rx.recv().await {
            let path = normalize_path(&event.path);
            match &path {
                Some(p) => tracing::debug!("Navigated to {}", p),
                None => tracing::debug!("Navigated to front page"),
            }
            tokio::spawn(store.load(path.as_deref()));
        }
        tracing::debug!("Navigation listener stopped");
    }
}
