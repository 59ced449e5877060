//! reqwest-backed fetcher

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::Duration;

use super::{parse_document, Fetch, FetchError};

/// HTTP fetcher with a per-request timeout
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    json_headers: HeaderMap,
}

impl HttpFetcher {
    /// Create a fetcher whose requests fail after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kontentsu-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;

        let mut json_headers = HeaderMap::new();
        json_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client,
            json_headers,
        })
    }

    async fn send(&self, url: &str, headers: HeaderMap) -> Result<Response, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let response = self
            .client
            .get(parsed)
            .headers(headers)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let response = self.send(url, self.json_headers.clone()).await?;
        let body = response.text().await.map_err(|e| body_error(url, e))?;
        parse_document(url, &body)
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.send(url, HeaderMap::new()).await?;
        response.text().await.map_err(|e| body_error(url, e))
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

fn body_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
