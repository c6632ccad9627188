//! Latency-based mirror selection.

use crate::classify::classify_reqwest;
use async_trait::async_trait;
use futures::future::join_all;
use kiln_core::{Error, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// One successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointLatencySample {
    pub endpoint: String,
    pub latency: Duration,
}

/// Measures round-trip latency to an endpoint.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, endpoint: &str) -> Result<Duration>;
}

/// Sends `HEAD /` to the endpoint's origin. Any HTTP response, whatever its
/// status, means the host is alive.
#[derive(Debug, Clone, Default)]
pub struct HttpPinger {
    client: Client,
}

impl HttpPinger {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Pinger for HttpPinger {
    async fn ping(&self, endpoint: &str) -> Result<Duration> {
        let mut origin = Url::parse(endpoint)
            .map_err(|e| Error::InvalidConfig(format!("Bad endpoint {}: {}", endpoint, e)))?;
        origin.set_path("/");
        origin.set_query(None);

        let start = Instant::now();
        self.client
            .head(origin)
            .send()
            .await
            .map_err(classify_reqwest)?;
        Ok(start.elapsed())
    }
}

/// Ranks the mirrors of one group by probe latency.
#[derive(Clone)]
pub struct EndpointSelector {
    pinger: Arc<dyn Pinger>,
    timeout: Duration,
}

impl EndpointSelector {
    pub fn new(pinger: Arc<dyn Pinger>, timeout: Duration) -> Self {
        Self { pinger, timeout }
    }

    /// Probe every endpoint concurrently and return the responsive ones,
    /// fastest first. Equal latencies keep their listed order.
    pub async fn rank(&self, endpoints: &[String]) -> Vec<EndpointLatencySample> {
        let probes = endpoints.iter().map(|endpoint| async move {
            match tokio::time::timeout(self.timeout, self.pinger.ping(endpoint)).await {
                Ok(Ok(latency)) => {
                    debug!(endpoint = %endpoint, latency_ms = latency.as_millis() as u64, "Probed endpoint");
                    Some(EndpointLatencySample {
                        endpoint: endpoint.clone(),
                        latency,
                    })
                }
                Ok(Err(e)) => {
                    debug!(endpoint = %endpoint, error = %e, "Endpoint probe failed");
                    None
                }
                Err(_) => {
                    debug!(endpoint = %endpoint, timeout = ?self.timeout, "Endpoint probe timed out");
                    None
                }
            }
        });

        let mut samples: Vec<_> = join_all(probes).await.into_iter().flatten().collect();
        samples.sort_by_key(|sample| sample.latency);
        samples
    }

    /// The fastest responsive endpoint, if any responded at all.
    pub async fn select(&self, endpoints: &[String]) -> Option<String> {
        let best = self.rank(endpoints).await.into_iter().next();
        match &best {
            Some(sample) => debug!(endpoint = %sample.endpoint, "Selected endpoint"),
            None => warn!(candidates = ?endpoints, "No endpoint in mirror group responded"),
        }
        best.map(|sample| sample.endpoint)
    }
}
