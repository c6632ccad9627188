//! REST artifact cache backend: HEAD, GET, PUT and DELETE on object URLs.

use super::{RemoteKind, RemoteStore};
use crate::classify::{classify_reqwest, classify_status};
use crate::config::TierConfig;
use crate::stream::{READ_SIZE_BYTES, UPLOAD_CHUNK_BYTES, bounded, file_chunks};
use async_trait::async_trait;
use futures::TryStreamExt;
use kiln_core::{ArtifactStream, Error, FailureKind, Result};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// One HTTP cache endpoint.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    origin: Url,
    write_timeout: Duration,
}

impl HttpStore {
    /// Create a store rooted at the endpoint's origin. The endpoint path is
    /// not used here; it becomes the tier's key prefix.
    pub fn new(endpoint: &Url, config: &TierConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.read_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint, config.write_timeout()))
    }

    pub fn with_client(client: Client, endpoint: &Url, write_timeout: Duration) -> Self {
        let mut origin = endpoint.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        Self {
            client,
            origin,
            write_timeout,
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn object_url(&self, path: &str) -> Result<Url> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::remote(
                    FailureKind::Unknown,
                    format!("{} cannot be used as a base URL", self.origin),
                )
            })?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    fn kind(&self) -> RemoteKind {
        RemoteKind::Http
    }

    fn location(&self) -> String {
        self.origin.to_string()
    }

    async fn head(&self, path: &str) -> Result<()> {
        let url = self.object_url(path)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(classify_reqwest)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_status(response.status(), "HEAD", url.as_str()))
        }
    }

    async fn get(&self, path: &str) -> Result<ArtifactStream> {
        let url = self.object_url(path)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_reqwest)?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "GET", url.as_str()));
        }
        debug!(url = %url, length = ?response.content_length(), "Opened artifact");
        Ok(bounded(
            response.bytes_stream().map_err(classify_reqwest),
            READ_SIZE_BYTES,
        ))
    }

    async fn put(&self, path: &str, artifact: &Path) -> Result<()> {
        let url = self.object_url(path)?;
        let (len, chunks) = file_chunks(artifact, UPLOAD_CHUNK_BYTES).await?;
        let response = self
            .client
            .put(url.clone())
            .timeout(self.write_timeout)
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_TYPE, "application/gzip")
            .body(Body::wrap_stream(chunks))
            .send()
            .await
            .map_err(classify_reqwest)?;
        if response.status().is_success() {
            debug!(url = %url, bytes = len, "Uploaded artifact");
            Ok(())
        } else {
            Err(classify_status(response.status(), "PUT", url.as_str()))
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.object_url(path)?;
        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(classify_reqwest)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(classify_status(status, "DELETE", url.as_str()))
        }
    }
}
