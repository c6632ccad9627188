//! Tiered cache against an HTTP REST cache.

use kiln_cache::{CacheFactory, TierConfig};
use kiln_core::{ArtifactCache, Error, FailureKind, FetchResult};
use kiln_tests::{
    ArtifactWorkspace, KeyFixture, ObjectServer, assert_completes_within, init_test_logging,
    refused_endpoint, status_server,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn factory(ws: &ArtifactWorkspace) -> CacheFactory {
    CacheFactory::new(ws.root(), TierConfig::default()).unwrap()
}

#[tokio::test]
async fn test_insert_then_fetch_after_clean() {
    init_test_logging();
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");

    let remote = format!("{}/artifacts", server.uri());
    let cache = factory(&ws)
        .build_from_tokens(&[ws.local_token(), remote])
        .await
        .unwrap()
        .expect("tiered cache");
    assert!(cache.is_tiered());

    cache.insert(&key, &paths).await.unwrap();
    let object_path = format!("/artifacts/{}/app.tgz", key.hash());
    assert_eq!(server.object_paths(), vec![object_path.clone()]);
    assert_eq!(
        server.object(&object_path).unwrap(),
        std::fs::read(cache.local().artifact_path(&key)).unwrap()
    );

    // Fresh machine: empty local cache, no outputs.
    ws.remove("dist");
    cache.local().delete(&key).await;
    assert!(cache.has(&key).await);

    assert_eq!(cache.fetch(&key, None).await, FetchResult::Hit);
    assert_eq!(
        ws.read("dist/app/bin/app").unwrap(),
        b"\x7fELF fake binary".to_vec()
    );
    assert!(cache.local().has(&key).await);
}

#[tokio::test]
async fn test_local_hit_makes_no_remote_request() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");

    let cache = factory(&ws)
        .build_from_tokens(&[ws.local_token(), server.uri()])
        .await
        .unwrap()
        .unwrap();
    cache.insert(&key, &paths).await.unwrap();
    let before = server.object_requests().await.len();

    assert!(cache.has(&key).await);
    assert_eq!(cache.fetch(&key, None).await, FetchResult::Hit);
    assert_eq!(server.object_requests().await.len(), before);
}

#[tokio::test]
async fn test_remote_only_cache_stages_through_temp_dir() {
    let server = ObjectServer::start().await;
    let producer = ArtifactWorkspace::new();
    let consumer = ArtifactWorkspace::new();
    let key = KeyFixture::key("lib");
    let paths = producer.write_target_outputs("lib");
    let remote = format!("{}/shared", server.uri());

    let writer = factory(&producer)
        .build_from_tokens(&[remote.as_str()])
        .await
        .unwrap()
        .unwrap();
    assert!(writer.local().is_ephemeral());
    writer.insert(&key, &paths).await.unwrap();

    let reader = factory(&consumer)
        .build_from_tokens(&[remote.as_str()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reader.fetch(&key, None).await, FetchResult::Hit);
    assert!(consumer.read("dist/lib/share/manifest.json").is_some());
}

#[tokio::test]
async fn test_fetch_into_results_dir() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");
    let cache = factory(&ws)
        .build_from_tokens(&[server.uri()])
        .await
        .unwrap()
        .unwrap();
    cache.insert(&key, &paths).await.unwrap();

    let results = tempfile::tempdir().unwrap();
    cache.local().delete(&key).await;
    assert_eq!(
        cache.fetch(&key, Some(results.path())).await,
        FetchResult::Hit
    );
    assert!(results.path().join("dist/app/bin/app").exists());
}

#[tokio::test]
async fn test_missing_object_is_a_quiet_miss() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let cache = factory(&ws)
        .build_from_tokens(&[ws.local_token(), server.uri()])
        .await
        .unwrap()
        .unwrap();
    let key = KeyFixture::key("never-built");

    assert!(!cache.has(&key).await);
    assert_eq!(cache.fetch(&key, None).await, FetchResult::Miss);
    cache.delete(&key).await;
}

#[tokio::test]
async fn test_delete_removes_remote_object() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");
    let cache = factory(&ws)
        .build_from_tokens(&[ws.local_token(), server.uri()])
        .await
        .unwrap()
        .unwrap();

    cache.insert(&key, &paths).await.unwrap();
    cache.delete(&key).await;

    assert!(server.object_paths().is_empty());
    assert!(!cache.has(&key).await);
}

#[tokio::test]
async fn test_server_error_is_unreadable() {
    let server = status_server(500).await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let cache = factory(&ws)
        .build_from_tokens(&[ws.local_token(), server.uri()])
        .await
        .unwrap()
        .unwrap();

    assert!(!cache.has(&key).await);
    assert!(cache.fetch(&key, None).await.is_unreadable());

    let paths = ws.write_target_outputs("app");
    let err = cache.insert(&key, &paths).await.unwrap_err();
    assert!(matches!(
        err,
        Error::NonfatalCache {
            kind: FailureKind::Unknown,
            ..
        }
    ));
    assert!(cache.local().has(&key).await);
}

#[tokio::test]
async fn test_corrupt_remote_object_is_unreadable() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    server.put_object(
        &format!("/c/{}/app.tgz", key.hash()),
        b"definitely not gzip".to_vec(),
    );
    let cache = factory(&ws)
        .build_from_tokens(&[ws.local_token(), format!("{}/c", server.uri())])
        .await
        .unwrap()
        .unwrap();

    assert!(cache.has(&key).await);
    assert!(cache.fetch(&key, None).await.is_unreadable());
    assert!(!cache.local().has(&key).await);
}

#[tokio::test]
async fn test_fastest_live_mirror_wins() {
    let primary = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let group = format!("{}/c|{}/c", refused_endpoint(), primary.uri());

    let cache = factory(&ws)
        .build_from_tokens(&[group])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        cache.remote().unwrap().location(),
        format!("{}/", primary.uri())
    );
}

#[tokio::test]
async fn test_unreachable_group_degrades() {
    let ws = ArtifactWorkspace::new();
    let group = format!("{}|{}", refused_endpoint(), refused_endpoint());

    let cache = assert_completes_within(
        factory(&ws).build_from_tokens(&[ws.local_token(), group.clone()]),
        Duration::from_secs(5),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(!cache.is_tiered());

    let none = factory(&ws).build_from_tokens(&[group]).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_slow_server_times_out_as_miss_without_local_state() {
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    for verb in ["GET", "HEAD"] {
        Mock::given(method(verb))
            .and(path_regex("^/slow/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late bytes".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
    }

    let ws = ArtifactWorkspace::new();
    let key = KeyFixture::key("app");
    let config = TierConfig {
        read_timeout_secs: 1,
        ..TierConfig::default()
    };
    let cache = CacheFactory::new(ws.root(), config)
        .unwrap()
        .build_from_tokens(&[ws.local_token(), format!("{}/slow", server.uri())])
        .await
        .unwrap()
        .expect("tiered cache");

    let fetched = assert_completes_within(cache.fetch(&key, None), Duration::from_secs(10)).await;
    assert_eq!(fetched, FetchResult::Miss);
    assert!(!cache.local().has(&key).await);
    assert!(!cache.has(&key).await);

    let target_dir = cache.local().artifact_path(&key);
    let leftovers = std::fs::read_dir(target_dir.parent().unwrap())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}
