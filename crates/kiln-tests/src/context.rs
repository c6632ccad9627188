//! Test context for object-store integration tests.

use crate::containers::MinioContainer;
use crate::fixtures::ArtifactWorkspace;
use crate::helpers::s3_tier_config_with_keys;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use kiln_cache::TierConfig;

/// A running MinIO with an empty bucket, plus a workspace whose tier
/// config points at it.
///
/// Drop this to stop the container.
pub struct MinioContext {
    pub minio: MinioContainer,
    pub workspace: ArtifactWorkspace,
    pub bucket: String,
    pub config: TierConfig,
}

impl MinioContext {
    pub async fn new(bucket: &str) -> anyhow::Result<Self> {
        crate::init_test_logging();

        let minio = MinioContainer::start().await?;
        let workspace = ArtifactWorkspace::new();
        let config = s3_tier_config_with_keys(
            minio.endpoint(),
            workspace.scratch(),
            minio.access_key(),
            minio.secret_key(),
        );

        let admin = aws_sdk_s3::Client::from_conf(
            aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .endpoint_url(minio.endpoint())
                .force_path_style(true)
                .credentials_provider(Credentials::new(
                    minio.access_key(),
                    minio.secret_key(),
                    None,
                    None,
                    "kiln-tests",
                ))
                .build(),
        );
        admin.create_bucket().bucket(bucket).send().await?;

        Ok(Self {
            minio,
            workspace,
            bucket: bucket.to_string(),
            config,
        })
    }

    /// Remote spec token for the bucket under `prefix`.
    pub fn remote_token(&self, prefix: &str) -> String {
        format!("s3://{}/{}", self.bucket, prefix)
    }
}
