//! Template loader
//!
//! Follows the content store: for every published page it fetches the page's
//! template, compiles it into a fresh [`RenderUnit`], fills the unit's page
//! slot and mounts it. Failures leave the mounted unit alone.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use super::{MountPoint, RenderUnit, Template, TemplateError};
use crate::config::ClientConfig;
use crate::content::{ContentStore, Page, StoreEvent, SubscriptionId};
use crate::fetch::Fetch;
use crate::render::ContentTree;

/// Loads, compiles and mounts page templates
pub struct TemplateLoader {
    config: ClientConfig,
    fetcher: Arc<dyn Fetch>,
    mount: Arc<MountPoint>,
    tree: Arc<ContentTree>,
    /// Message of the latest failure for the most recently shown page
    failure: watch::Sender<Option<String>>,
}

impl TemplateLoader {
    pub fn new(
        config: ClientConfig,
        fetcher: Arc<dyn Fetch>,
        mount: Arc<MountPoint>,
        tree: Arc<ContentTree>,
    ) -> Self {
        let (failure, _) = watch::channel(None);
        Self {
            config,
            fetcher,
            mount,
            tree,
            failure,
        }
    }

    /// Watch template failures of the most recently shown page
    pub fn subscribe_failures(&self) -> watch::Receiver<Option<String>> {
        self.failure.subscribe()
    }

    /// Show every page the store publishes from now on
    pub fn attach(self: &Arc<Self>, store: &ContentStore) -> SubscriptionId {
        let loader = Arc::clone(self);
        store.subscribe(move |event| match event {
            StoreEvent::Page(page) => {
                tokio::spawn(loader.show(Arc::clone(page)));
            }
            StoreEvent::Failed { url, message } => {
                tracing::warn!("Keeping current template, content at {} failed: {}", url, message);
            }
        })
    }

    /// Fetch, compile and mount the template for `page`
    ///
    /// The mount is claimed when this is called; if another page is shown
    /// before this one finishes, this one is dropped. Resolves to whether
    /// the unit was mounted.
    pub fn show(
        self: &Arc<Self>,
        page: Arc<Page>,
    ) -> impl Future<Output = Result<bool, TemplateError>> + Send + 'static {
        let ticket = self.mount.claim();
        let loader = Arc::clone(self);

        async move {
            let result = loader.build_unit(ticket.id(), &page).await;
            match result {
                Ok(unit) => {
                    if !loader.mount.is_current(ticket) {
                        tracing::debug!(
                            "Dropping template {} for superseded page {}",
                            page.template(),
                            page.url()
                        );
                        unit.dispose();
                        return Ok(false);
                    }
                    Ok(loader.mount.mount(unit, &loader.tree))
                }
                Err(e) => {
                    tracing::error!("Error getting template {}: {}", page.template(), e);
                    if loader.mount.is_current(ticket) {
                        loader.failure.send_replace(Some(e.to_string()));
                    }
                    Err(e)
                }
            }
        }
    }

    async fn build_unit(&self, id: u64, page: &Page) -> Result<RenderUnit, TemplateError> {
        let url = self
            .config
            .resolve_template(page.template())
            .map_err(|e| TemplateError::Reference {
                reference: page.template().to_string(),
                message: e.to_string(),
            })?;

        let source = self.fetcher.get_text(url.as_str()).await?;
        tracing::info!("Template: {}", page.template());
        tracing::debug!("Template data: {}", source);

        let template = Template::compile(&source)?;
        let mut unit = RenderUnit::new(id, page.template(), template);
        unit.set_page(page.data().clone());
        Ok(unit)
    }
}
