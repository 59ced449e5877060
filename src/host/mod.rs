//! Host document - the environment pages are rendered into
//!
//! The content pipeline only talks to its host through [`Host`]: it sets the
//! document title and dispatches the one-shot `appready`/`apperror` signals.

use std::fmt;
use std::sync::Mutex;

/// Signals dispatched to the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// First page delivered
    AppReady,
    /// Initial content load failed
    AppError,
}

impl HostSignal {
    /// Event name as seen by the host
    pub fn name(&self) -> &'static str {
        match self {
            HostSignal::AppReady => "appready",
            HostSignal::AppError => "apperror",
        }
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The environment a client renders into
pub trait Host: Send + Sync {
    /// Set the document title
    fn set_title(&self, title: &str);

    /// Dispatch a signal to the document
    fn signal(&self, signal: HostSignal);
}

#[derive(Debug, Default)]
struct DocumentState {
    title: Option<String>,
    signals: Vec<HostSignal>,
}

/// In-memory host document
#[derive(Debug, Default)]
pub struct Document {
    state: Mutex<DocumentState>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document title, if one was set
    pub fn title(&self) -> Option<String> {
        self.lock().title.clone()
    }

    /// Signals dispatched so far, in dispatch order
    pub fn signals(&self) -> Vec<HostSignal> {
        self.lock().signals.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DocumentState> {
        // a poisoned title is still a usable title
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Host for Document {
    fn set_title(&self, title: &str) {
        self.lock().title = Some(title.to_string());
    }

    fn signal(&self, signal: HostSignal) {
        tracing::debug!("Dispatching {} to host document", signal);
        self.lock().signals.push(signal);
    }
}
