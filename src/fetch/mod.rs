//! Fetch module - the HTTP seam used for content documents and templates
//!
//! - [`Fetch`]: async trait implemented by anything that can GET a URL
//! - [`HttpFetcher`]: reqwest-based implementation with a bounded timeout

mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpFetcher;

/// Errors raised while fetching a resource
///
/// Timeouts, transport failures and non-success statuses are all fetch
/// failures; callers do not need to tell them apart.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Unreadable body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("Document from {url} is nested deeper than {limit} levels")]
    TooDeep { url: String, limit: usize },
}

impl FetchError {
    /// URL of the failed request
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::Request { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Status { url, .. }
            | FetchError::Body { url, .. }
            | FetchError::TooDeep { url, .. } => url,
        }
    }
}

/// Something that can GET a URL
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch a JSON document
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError>;

    /// Fetch a resource as opaque text
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Deepest array/object nesting accepted in a JSON document
pub const MAX_DOCUMENT_DEPTH: usize = 512;

/// Parse a JSON document body
///
/// Nesting is checked before parsing so an oversized document is rejected
/// without recursing into it. Within the bound, serde_json's own recursion
/// limit does not apply.
pub fn parse_document(url: &str, body: &str) -> Result<Value, FetchError> {
    if exceeds_depth(body, MAX_DOCUMENT_DEPTH) {
        return Err(FetchError::TooDeep {
            url: url.to_string(),
            limit: MAX_DOCUMENT_DEPTH,
        });
    }

    let body_error = |e: serde_json::Error| FetchError::Body {
        url: url.to_string(),
        message: e.to_string(),
    };
    let mut de = serde_json::Deserializer::from_str(body);
    de.disable_recursion_limit();
    let value = Value::deserialize(&mut de).map_err(body_error)?;
    de.end().map_err(body_error)?;
    Ok(value)
}

/// Whether arrays and objects in `body` nest deeper than `limit`
fn exceeds_depth(body: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for b in body.bytes() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}
