//! Render one page to a standalone HTML document

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::fetch::HttpFetcher;
use crate::host::Document;
use crate::navigation::normalize_path;
use crate::render::html;
use crate::Kontentsu;

/// Render the page at `location` and write it to `output`, or stdout
pub async fn run(config: ClientConfig, location: &str, output: Option<&Path>) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout())?);
    let doc = Arc::new(Document::new());
    let app = Kontentsu::new(config, fetcher, doc.clone());

    let page = render_page(&app, location).await?;
    let document = document(doc.title().as_deref(), &page);

    match output {
        Some(path) => {
            std::fs::write(path, document)
                .with_context(|| format!("Failed to write {:?}", path))?;
            tracing::info!("Wrote {:?}", path);
        }
        None => println!("{}", document),
    }
    Ok(())
}

/// Load `location` and mount its template, returning the mounted markup
pub async fn render_page(app: &Kontentsu, location: &str) -> Result<String> {
    let path = normalize_path(location);
    let timeout = app.config().fetch_timeout();

    let page = tokio::time::timeout(timeout, app.store().load(path.as_deref()))
        .await
        .map_err(|_| anyhow!("Timed out loading {}", location))??
        .ok_or_else(|| anyhow!("Load of {} was superseded", location))?;

    let mounted = tokio::time::timeout(timeout, app.loader().show(page))
        .await
        .map_err(|_| anyhow!("Timed out loading template for {}", location))??;
    if !mounted {
        return Err(anyhow!("Template for {} was superseded", location));
    }

    app.mount()
        .current()
        .map(|view| view.html.clone())
        .ok_or_else(|| anyhow!("Nothing mounted for {}", location))
}

/// Wrap mounted markup in a host document
pub fn document(title: Option<&str>, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>",
        html::escape(title.unwrap_or_default()),
        body
    )
}
