//! Building read and write caches from configuration.

use kiln_cache::{CacheFactory, CacheOptions, CacheSetup, TierConfig};
use kiln_core::{ArtifactCache, Error, FetchResult};
use kiln_tests::{ArtifactWorkspace, KeyFixture, ObjectServer};

fn setup(ws: &ArtifactWorkspace, options: CacheOptions) -> CacheSetup {
    CacheSetup::new(
        options,
        CacheFactory::new(ws.root(), TierConfig::default()).unwrap(),
    )
}

#[tokio::test]
async fn test_write_then_read_with_separate_caches() {
    let server = ObjectServer::start().await;
    let ws = ArtifactWorkspace::new();
    let remote = format!("{}/artifacts", server.uri());
    let options = CacheOptions {
        read: true,
        write: true,
        read_from: vec![remote.clone()],
        write_to: vec![ws.local_token(), remote],
    };
    let setup = setup(&ws, options);
    let key = KeyFixture::key("app");
    let paths = ws.write_target_outputs("app");

    let writer = setup.write_cache().await.unwrap().unwrap();
    writer.insert(&key, &paths).await.unwrap();
    ws.remove("dist");

    let reader = setup.read_cache().await.unwrap().unwrap();
    assert!(reader.local().is_ephemeral());
    assert_eq!(reader.fetch(&key, None).await, FetchResult::Hit);
    assert!(ws.read("dist/app/bin/app").is_some());
}

#[tokio::test]
async fn test_disabled_or_unconfigured_caches_are_absent() {
    let ws = ArtifactWorkspace::new();

    let disabled = setup(
        &ws,
        CacheOptions {
            read: false,
            write: false,
            read_from: vec![ws.local_token()],
            write_to: vec![ws.local_token()],
        },
    );
    assert!(disabled.read_cache().await.unwrap().is_none());
    assert!(disabled.write_cache().await.unwrap().is_none());

    let unconfigured = setup(
        &ws,
        CacheOptions {
            read: true,
            write: true,
            ..CacheOptions::default()
        },
    );
    assert!(unconfigured.read_cache().await.unwrap().is_none());
    assert!(unconfigured.write_cache().await.unwrap().is_none());
}

async fn read_error(ws: &ArtifactWorkspace, tokens: &[&str]) -> Error {
    let s = setup(
        ws,
        CacheOptions {
            read: true,
            read_from: tokens.iter().map(|t| t.to_string()).collect(),
            ..CacheOptions::default()
        },
    );
    match s.read_cache().await {
        Ok(_) => panic!("{:?} should not build a cache", tokens),
        Err(e) => {
            assert!(e.is_configuration(), "{:?} gave {:?}", tokens, e);
            e
        }
    }
}

#[tokio::test]
async fn test_malformed_specs_fail_at_setup() {
    let ws = ArtifactWorkspace::new();

    assert!(matches!(
        read_error(&ws, &["a", "b"]).await,
        Error::CacheSpecFormat { .. }
    ));
    assert!(matches!(
        read_error(&ws, &["../cache"]).await,
        Error::CacheSpecFormat { .. }
    ));
    assert!(matches!(
        read_error(&ws, &["/a", "/b", "/c"]).await,
        Error::TooManyLocalSpecs(3)
    ));
    assert!(matches!(
        read_error(&ws, &["/a", "s3://b/x", "s3://c/x"]).await,
        Error::TooManyRemoteSpecs(2)
    ));
    assert!(matches!(
        read_error(&ws, &["s3://b/x|http://c/x"]).await,
        Error::CacheSpecFormat { .. }
    ));
}

#[test]
fn test_compression_level_is_checked_up_front() {
    for level in [-1, 10, 42] {
        let config = TierConfig {
            compression_level: level,
            ..TierConfig::default()
        };
        assert!(matches!(
            CacheFactory::new("/tmp", config),
            Err(Error::InvalidCompressionLevel(l)) if l == level
        ));
    }
}

#[tokio::test]
async fn test_local_cache_evicts_old_builds() {
    let ws = ArtifactWorkspace::new();
    let config = TierConfig {
        max_entries_per_target: Some(2),
        ..TierConfig::default()
    };
    let cache = CacheFactory::new(ws.root(), config)
        .unwrap()
        .build_from_tokens(&[ws.local_token()])
        .await
        .unwrap()
        .unwrap();

    let keys: Vec<_> = ["h1", "h2", "h3"]
        .iter()
        .map(|h| KeyFixture::with_hash("app", h))
        .collect();
    for key in &keys {
        let paths = ws.write_target_outputs("app");
        cache.insert(key, &paths).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    assert!(!cache.has(&keys[0]).await);
    assert!(cache.has(&keys[1]).await);
    assert!(cache.has(&keys[2]).await);
}
