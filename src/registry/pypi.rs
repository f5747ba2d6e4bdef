use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistrySettings;
use crate::error::Result;

const USER_AGENT: &str = concat!("license-auditor/", env!("CARGO_PKG_VERSION"));

/// License-relevant fields of a PyPI release.
#[derive(Debug, Clone, PartialEq)]
pub struct PypiMetadata {
    pub name: String,
    pub version: String,
    pub license: Option<String>,
    pub license_expression: Option<String>,
    pub classifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    info: Option<ReleaseInfo>,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    name: Option<String>,
    version: Option<String>,
    license: Option<String>,
    license_expression: Option<String>,
    #[serde(default)]
    classifiers: Option<Vec<String>>,
}

/// Client for the PyPI JSON API (`{base}/{name}/{version}/json`).
pub struct PypiClient {
    client: Client,
    base_url: String,
}

impl PypiClient {
    pub fn new(settings: &RegistrySettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    fn release_url(&self, name: &str, version: &str) -> Option<Url> {
        let mut url = Url::parse(&self.base_url).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend([name, version, "json"]);
        Some(url)
    }

    /// Metadata of one release. Any failure (non-200 status, transport error,
    /// timeout, malformed payload) yields `None`.
    pub async fn fetch_metadata(&self, name: &str, version: &str) -> Option<PypiMetadata> {
        let url = self.release_url(name, version)?;

        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("PyPI request for {} failed: {}", url, e);
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!("PyPI returned {} for {}", response.status(), url);
            return None;
        }

        let body: ReleaseResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                debug!("Malformed PyPI payload for {}: {}", url, e);
                return None;
            }
        };

        let info = body.info?;
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Some(PypiMetadata {
            name: non_empty(info.name)?,
            version: non_empty(info.version)?,
            license: non_empty(info.license),
            license_expression: non_empty(info.license_expression),
            classifiers: info.classifiers.unwrap_or_default(),
        })
    }
}
