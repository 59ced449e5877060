//! In-memory fetcher for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{parse_document, Fetch, FetchError};

#[derive(Clone)]
enum Canned {
    Json(serde_json::Value),
    Text(String),
    Status(u16),
}

#[derive(Default)]
struct State {
    responses: HashMap<String, Canned>,
    gates: HashMap<String, Arc<Notify>>,
    requests: Vec<String>,
}

/// Serves canned responses per URL; unknown URLs answer 404
#[derive(Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<State>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(&self, url: &str, body: serde_json::Value) -> &Self {
        self.insert(url, Canned::Json(body))
    }

    pub fn text(&self, url: &str, body: &str) -> &Self {
        self.insert(url, Canned::Text(body.to_string()))
    }

    pub fn status(&self, url: &str, status: u16) -> &Self {
        self.insert(url, Canned::Status(status))
    }

    /// Hold responses for `url` until the returned gate is notified
    pub fn hold(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .gates
            .insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    /// URLs requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    fn insert(&self, url: &str, canned: Canned) -> &Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(url.to_string(), canned);
        self
    }

    async fn respond(&self, url: &str) -> Result<Canned, FetchError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(url.to_string());
            state.gates.get(url).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let canned = self.state.lock().unwrap().responses.get(url).cloned();
        match canned {
            Some(Canned::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Some(canned) => Ok(canned),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        match self.respond(url).await? {
            Canned::Json(value) => Ok(value),
            Canned::Text(text) => parse_document(url, &text),
            Canned::Status(_) => unreachable!(),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        match self.respond(url).await? {
            Canned::Json(value) => Ok(value.to_string()),
            Canned::Text(text) => Ok(text),
            Canned::Status(_) => unreachable!(),
        }
    }
}
