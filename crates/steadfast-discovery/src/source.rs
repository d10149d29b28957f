//! Discovery source trait and the file-backed source

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

use crate::endpoint::{Endpoint, EndpointList};
use crate::error::SourceError;

/// Where endpoint lists come from
///
/// One call to [`fetch`](DiscoverySource::fetch) is one attempt; the
/// refresher decides whether a failure is retried.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Fetch the current endpoint list
    async fn fetch(&self) -> Result<Vec<Endpoint>, SourceError>;
}

#[async_trait]
impl<S: DiscoverySource + ?Sized> DiscoverySource for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self) -> Result<Vec<Endpoint>, SourceError> {
        (**self).fetch().await
    }
}

#[async_trait]
impl<S: DiscoverySource + ?Sized> DiscoverySource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self) -> Result<Vec<Endpoint>, SourceError> {
        (**self).fetch().await
    }
}

/// Reads endpoints from a YAML or JSON file
///
/// Files ending in `.json` are parsed as JSON, anything else as YAML.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: Utf8PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn is_json(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    fn parse(&self, content: &str) -> Result<Vec<Endpoint>, SourceError> {
        let list: EndpointList = if self.is_json() {
            serde_json::from_str(content).map_err(|e| SourceError::Malformed(e.to_string()))?
        } else {
            serde_yaml_ng::from_str(content).map_err(|e| SourceError::Malformed(e.to_string()))?
        };
        list.into_endpoints()
    }
}

#[async_trait]
impl DiscoverySource for FileSource {
    fn name(&self) -> &str {
        self.path.as_str()
    }

    async fn fetch(&self) -> Result<Vec<Endpoint>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        self.parse(&content)
    }
}
