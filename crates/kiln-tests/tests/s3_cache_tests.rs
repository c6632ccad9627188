//! Tiered cache against an S3-compatible store (path-style, static keys).

use kiln_cache::{CacheFactory, ConfiguredCache};
use kiln_core::{ArtifactCache, Error, FailureKind, FetchResult};
use kiln_tests::{ArtifactWorkspace, KeyFixture, ObjectServer, refused_endpoint, s3_tier_config};
use pretty_assertions::assert_eq;

async fn s3_cache(ws: &ArtifactWorkspace, endpoint: &str, remote: &str) -> ConfiguredCache {
    let config = s3_tier_config(endpoint, ws.scratch());
    CacheFactory::new(ws.root(), config)
        .unwrap()
        .build_from_tokens(&[ws.local_token().as_str(), remote])
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_insert_uploads_under_prefix() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");
    let cache = s3_cache(&ws, &server.uri(), "s3://artifacts/ci/main").await;

    cache.insert(&key, &paths).await.unwrap();

    let object_path = format!("/artifacts/ci/main/{}/app.tgz", key.hash());
    assert_eq!(server.object_paths(), vec![object_path.clone()]);
    assert_eq!(
        server.object(&object_path).unwrap(),
        std::fs::read(cache.local().artifact_path(&key)).unwrap()
    );
    assert!(cache.remote().unwrap().has(&key).await);
}

#[tokio::test]
async fn test_roundtrip_through_remote() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");
    let cache = s3_cache(&ws, &server.uri(), "s3://artifacts/x").await;
    cache.insert(&key, &paths).await.unwrap();

    cache.local().delete(&key).await;
    ws.remove("dist");

    assert_eq!(cache.fetch(&key, None).await, FetchResult::Hit);
    assert_eq!(
        ws.read("dist/app/share/manifest.json").unwrap(),
        b"{\"target\":\"app\"}".to_vec()
    );
}

#[tokio::test]
async fn test_missing_object() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let cache = s3_cache(&ws, &server.uri(), "s3://artifacts/x").await;
    let key = KeyFixture::key("missing");

    assert!(!cache.has(&key).await);
    assert_eq!(cache.fetch(&key, None).await, FetchResult::Miss);
    cache.delete(&key).await;
}

#[tokio::test]
async fn test_delete_removes_object() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");
    let cache = s3_cache(&ws, &server.uri(), "s3://artifacts/x").await;
    cache.insert(&key, &paths).await.unwrap();

    cache.delete(&key).await;
    assert!(server.object_paths().is_empty());
    assert!(!cache.has(&key).await);
}

#[tokio::test]
async fn test_refused_connection_degrades_to_miss() {
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let cache = s3_cache(&ws, &refused_endpoint(), "s3://artifacts/x").await;

    assert!(!cache.has(&key).await);
    assert_eq!(cache.fetch(&key, None).await, FetchResult::Miss);

    let paths = ws.write_target_outputs("app");
    let err = cache.insert(&key, &paths).await.unwrap_err();
    assert!(matches!(
        err,
        Error::NonfatalCache {
            kind: FailureKind::Network,
            ..
        }
    ));
    assert!(cache.local().has(&key).await);
}
