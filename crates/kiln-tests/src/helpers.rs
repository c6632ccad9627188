//! Test helper functions and utilities.

use kiln_cache::TierConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// In-memory object store over HTTP.
///
/// Objects are keyed by request path, so the same server backs an HTTP
/// cache (`/<prefix>/<hash>/<id>.tgz`) and a path-style S3 bucket
/// (`/<bucket>/<prefix>/<hash>/<id>.tgz`).
pub struct ObjectServer {
    server: MockServer,
    objects: Objects,
}

struct ObjectResponder {
    objects: Objects,
}

impl Respond for ObjectResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let path = request.url.path().to_string();
        let mut objects = self.objects.lock().unwrap();
        match request.method.as_str() {
            "GET" => match objects.get(&path) {
                Some(data) => ResponseTemplate::new(200)
                    .insert_header("content-type", "application/gzip")
                    .set_body_bytes(data.clone()),
                None => ResponseTemplate::new(404),
            },
            "HEAD" if objects.contains_key(&path) => ResponseTemplate::new(200),
            "HEAD" => ResponseTemplate::new(404),
            "PUT" => {
                objects.insert(path, request.body.clone());
                ResponseTemplate::new(200)
            }
            "DELETE" => {
                objects.remove(&path);
                ResponseTemplate::new(204)
            }
            _ => ResponseTemplate::new(405),
        }
    }
}

impl ObjectServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let objects = Objects::default();
        Mock::given(any())
            .respond_with(ObjectResponder {
                objects: objects.clone(),
            })
            .mount(&server)
            .await;
        Self { server, objects }
    }

    /// Base URI, e.g. `http://127.0.0.1:41234`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn put_object(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.into());
    }

    pub fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Requests received so far, excluding latency probes of `/`.
    pub async fn object_requests(&self) -> Vec<(String, String)> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() != "/")
            .map(|r| (r.method.to_string(), r.url.path().to_string()))
            .collect()
    }
}

/// Server that answers every request with the same status.
pub async fn status_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

/// A loopback URL nothing is listening on.
pub fn refused_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local address").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Tier config pointing the S3 client at `endpoint` with static
/// credentials written to a properties file under `credentials_dir`.
pub fn s3_tier_config(endpoint: &str, credentials_dir: &Path) -> TierConfig {
    s3_tier_config_with_keys(endpoint, credentials_dir, "AKIDKILNTEST", "kiln-test-secret")
}

pub fn s3_tier_config_with_keys(
    endpoint: &str,
    credentials_dir: &Path,
    access_key: &str,
    secret_key: &str,
) -> TierConfig {
    let credentials_file = credentials_dir.join("s3credentials");
    std::fs::write(
        &credentials_file,
        format!("accessKey={}\nsecretKey={}\n", access_key, secret_key),
    )
    .expect("Failed to write credentials file");

    let mut config = TierConfig::default();
    config.s3.profile = None;
    config.s3.credentials_file = credentials_file;
    config.s3.endpoint_url = Some(endpoint.to_string());
    config.s3.force_path_style = true;
    config
}

/// Assert that a future completes within a timeout.
pub async fn assert_completes_within<F, T>(future: F, timeout: std::time::Duration) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}
