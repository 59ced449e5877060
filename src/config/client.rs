//! Client configuration (kontentsu.yml)

use anyhow::{anyhow, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "kontentsu.yml";

/// Content client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Content path loaded when no navigation path is given
    pub front_page: String,
    /// Template used when a content document names none
    pub default_template: String,
    /// Base URL of the content files API; paths are appended verbatim
    pub files_api: String,
    /// Base URL that relative template references resolve against
    pub template_base: Option<String>,
    /// Upper bound for a single content or template fetch
    pub fetch_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            front_page: "pages/page-simple/".to_string(),
            default_template: "templates/responsive-one-article.tpl.html".to_string(),
            files_api: "http://localhost:9090/kontentsu/api/files/".to_string(),
            template_base: None,
            fetch_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `kontentsu.yml` from a directory, falling back to defaults
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILE);
        if path.exists() {
            tracing::debug!("Loading configuration from {:?}", path);
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Absolute URL of the content resource for a path
    pub fn content_url(&self, path: &str) -> String {
        format!("{}{}", self.files_api, path)
    }

    /// Base URL for relative template references
    pub fn template_base_url(&self) -> Result<Url> {
        match &self.template_base {
            Some(base) => Ok(Url::parse(base)?),
            None => {
                let api = Url::parse(&self.files_api)?;
                Ok(api.join("/")?)
            }
        }
    }

    /// Resolve a template reference to an absolute URL
    pub fn resolve_template(&self, reference: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(reference) {
            return Ok(url);
        }
        Ok(self.template_base_url()?.join(reference)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetchTimeoutSecs must be greater than zero"));
        }
        Url::parse(&self.files_api)
            .map_err(|e| anyhow!("Invalid filesApi {:?}: {}", self.files_api, e))?;
        Ok(())
    }
}
