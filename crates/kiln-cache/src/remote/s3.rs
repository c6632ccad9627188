//! S3-compatible object store backend.

use super::credentials::{self, CredentialSource};
use super::{RemoteKind, RemoteStore};
use crate::classify::{classify_s3, classify_s3_body};
use crate::config::TierConfig;
use crate::stream::{READ_SIZE_BYTES, bounded};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::primitives::ByteStream;
use kiln_core::{ArtifactStream, Error, FailureKind, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Build the process-wide S3 client.
///
/// SDK retries are disabled: a failed transfer is retried by the build's own
/// retry policy, and a slow retry loop would only delay the fallback to
/// building locally.
pub async fn build_client(config: &TierConfig) -> Client {
    let s3 = &config.s3;
    let source = credentials::resolve(s3.profile.as_deref(), &s3.credentials_file).await;

    let timeouts = TimeoutConfig::builder()
        .connect_timeout(config.read_timeout())
        .read_timeout(config.read_timeout())
        .build();
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(s3.region.clone()))
        .timeout_config(timeouts)
        .retry_config(RetryConfig::disabled());

    loader = match source {
        CredentialSource::Profile(name) => loader.profile_name(name),
        CredentialSource::PropertiesFile(creds) => loader.credentials_provider(creds),
        CredentialSource::Ambient => loader,
    };
    if let Some(endpoint) = &s3.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let shared = loader.load().await;
    let mut builder =
        aws_sdk_s3::config::Builder::from(&shared).force_path_style(s3.force_path_style);
    if s3.endpoint_url.is_some() {
        // S3-compatible stores commonly reject aws-chunked checksum trailers.
        builder = builder
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
    }

    info!(region = %s3.region, endpoint = ?s3.endpoint_url, "Connected S3 client");
    Client::from_conf(builder.build())
}

/// Objects in one bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    write_timeout: Duration,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>, write_timeout: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            write_timeout,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn kind(&self) -> RemoteKind {
        RemoteKind::S3
    }

    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn head(&self, path: &str) -> Result<()> {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_s3)
    }

    async fn get(&self, path: &str) -> Result<ArtifactStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(classify_s3)?;
        debug!(bucket = %self.bucket, path, length = ?output.content_length(), "Opened object");

        let chunks = futures::stream::unfold(output.body, |mut body| async move {
            body.next()
                .await
                .map(|chunk| (chunk.map_err(classify_s3_body), body))
        });
        Ok(bounded(chunks, READ_SIZE_BYTES))
    }

    async fn put(&self, path: &str, artifact: &Path) -> Result<()> {
        let body = ByteStream::from_path(artifact).await.map_err(|e| {
            Error::remote(
                FailureKind::Unknown,
                format!("Failed to open {}: {}", artifact.display(), e),
            )
        })?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type("application/gzip")
            .body(body)
            .send();
        match tokio::time::timeout(self.write_timeout, request).await {
            Ok(result) => result.map(|_| ()).map_err(classify_s3),
            Err(_) => Err(Error::remote(
                FailureKind::Network,
                format!("PUT {} timed out after {:?}", path, self.write_timeout),
            )),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_s3)
    }
}
