//! Page - a content document paired with the template that renders it

use serde::Serialize;
use serde_json::Value;

/// A resolved page
///
/// Pages are immutable; every successful load produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    template: String,
    data: Value,
    url: String,
    #[serde(skip)]
    seq: u64,
}

impl Page {
    pub fn new(template: impl Into<String>, data: Value) -> Self {
        Self {
            template: template.into(),
            data,
            url: String::new(),
            seq: 0,
        }
    }

    /// Build a page from a content document
    ///
    /// `template.href` in the document wins over `default_template`.
    pub fn from_document(document: Value, default_template: &str, url: &str, seq: u64) -> Self {
        let template = template_href(&document)
            .unwrap_or(default_template)
            .to_string();
        Self {
            template,
            data: document,
            url: url.to_string(),
            seq,
        }
    }

    /// Reference of the template that renders this page
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The content document
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// URL the content was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sequence number of the load request that produced this page
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// `content.heading`, when the document carries one
    pub fn heading(&self) -> Option<&str> {
        self.data
            .get("content")
            .and_then(|c| c.get("heading"))
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
    }

    /// Whether the template came from the document rather than the default
    pub fn has_own_template(&self) -> bool {
        template_href(&self.data).is_some()
    }
}

fn template_href(document: &Value) -> Option<&str> {
    document
        .get("template")
        .and_then(|t| t.get("href"))
        .and_then(Value::as_str)
        .filter(|href| !href.is_empty())
}
