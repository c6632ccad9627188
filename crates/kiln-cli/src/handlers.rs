//! Command handlers.

use crate::config::{KilnConfig, OutputFormat};
use console::style;
use kiln_cache::{
    CacheFactory, CacheSetup, ConfiguredCache, EndpointSelector, HttpPinger, RemoteKind,
    RemoteSpec, key_for_inputs,
};
use kiln_core::{ArtifactCache, CacheKey, FetchResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

type HandlerResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Serialize)]
struct KeyStatus<'a> {
    key: &'a CacheKey,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn report(config: &KilnConfig, key: &CacheKey, status: &str, detail: Option<String>) -> HandlerResult {
    match config.output_format {
        OutputFormat::Json => {
            let line = KeyStatus { key, status, detail };
            println!("{}", serde_json::to_string(&line)?);
        }
        OutputFormat::Table => {
            let marker = match status {
                "hit" | "present" | "stored" | "deleted" => style("✓").green(),
                "miss" | "absent" => style("✗").yellow(),
                _ => style("!").red(),
            };
            match detail {
                Some(detail) => println!("{} {} {} ({})", marker, style(key).bold(), status, detail),
                None => println!("{} {} {}", marker, style(key).bold(), status),
            }
        }
    }
    Ok(())
}

fn setup(config: &KilnConfig) -> Result<CacheSetup, Box<dyn std::error::Error>> {
    let factory = CacheFactory::new(&config.artifact_root, config.tier.clone())?;
    debug!(artifact_root = %config.artifact_root.display(), "Cache factory ready");
    Ok(CacheSetup::new(config.cache.clone(), factory))
}

async fn read_cache(config: &KilnConfig) -> Result<ConfiguredCache, Box<dyn std::error::Error>> {
    setup(config)?
        .read_cache()
        .await?
        .ok_or_else(|| "No read cache available: enable `cache.read` and set `cache.read_from`".into())
}

async fn write_cache(config: &KilnConfig) -> Result<ConfiguredCache, Box<dyn std::error::Error>> {
    setup(config)?
        .write_cache()
        .await?
        .ok_or_else(|| "No write cache available: enable `cache.write` and set `cache.write_to`".into())
}

/// Check whether an artifact is cached.
pub async fn has(config: &KilnConfig, key: CacheKey) -> HandlerResult {
    let cache = read_cache(config).await?;
    let status = if cache.has(&key).await { "present" } else { "absent" };
    report(config, &key, status, None)
}

/// Restore a cached artifact.
pub async fn fetch(config: &KilnConfig, key: CacheKey, dest: Option<PathBuf>) -> HandlerResult {
    let cache = read_cache(config).await?;
    match cache.fetch(&key, dest.as_deref()).await {
        FetchResult::Hit => report(config, &key, "hit", None),
        FetchResult::Miss => report(config, &key, "miss", None),
        FetchResult::Unreadable { reason, .. } => {
            report(config, &key, "unreadable", Some(reason.clone()))?;
            Err(format!("Cached artifact {} is unreadable: {}", key, reason).into())
        }
    }
}

/// Package outputs and store them in the cache.
pub async fn insert(
    config: &KilnConfig,
    id: String,
    hash: Option<String>,
    inputs: Vec<PathBuf>,
    paths: Vec<PathBuf>,
) -> HandlerResult {
    let key = match hash {
        Some(hash) => CacheKey::new(id, hash),
        None if !inputs.is_empty() => {
            let inputs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
            key_for_inputs(&id, &inputs)?
        }
        None => return Err("Either --hash or --inputs is required".into()),
    };

    let cache = write_cache(config).await?;
    match cache.insert(&key, &paths).await {
        Ok(()) => report(config, &key, "stored", None),
        Err(e) => {
            warn!(key = %key, error = %e, "Artifact not stored in every tier");
            report(config, &key, "degraded", Some(e.to_string()))
        }
    }
}

/// Remove an artifact from every tier.
pub async fn delete(config: &KilnConfig, key: CacheKey) -> HandlerResult {
    let cache = write_cache(config).await?;
    cache.delete(&key).await;
    report(config, &key, "deleted", None)
}

#[derive(Serialize)]
struct ProbeRow {
    endpoint: String,
    latency_ms: Option<u128>,
}

/// Rank a mirror group by latency.
pub async fn probe(config: &KilnConfig, group: &str) -> HandlerResult {
    let spec = RemoteSpec::parse(group)?;
    if spec.kind() != RemoteKind::Http {
        return Err(format!("Only HTTP mirror groups can be probed, got {}", spec.kind()).into());
    }

    let candidates: Vec<String> = spec.urls().iter().map(|u| u.to_string()).collect();
    let selector = EndpointSelector::new(Arc::new(HttpPinger::default()), config.tier.probe_timeout());
    let ranked = selector.rank(&candidates).await;

    let mut rows: Vec<ProbeRow> = ranked
        .iter()
        .map(|sample| ProbeRow {
            endpoint: sample.endpoint.clone(),
            latency_ms: Some(sample.latency.as_millis()),
        })
        .collect();
    rows.extend(
        candidates
            .iter()
            .filter(|c| !ranked.iter().any(|s| &s.endpoint == *c))
            .map(|c| ProbeRow {
                endpoint: c.clone(),
                latency_ms: None,
            }),
    );

    match config.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => {
            println!("{:<50} {:>10}", style("ENDPOINT").bold(), style("LATENCY").bold());
            for row in &rows {
                let latency = match row.latency_ms {
                    Some(ms) => format!("{} ms", ms),
                    None => style("down").red().to_string(),
                };
                println!("{:<50} {:>10}", row.endpoint, latency);
            }
        }
    }
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &KilnConfig) -> HandlerResult {
    println!("Current configuration:");
    println!("{}", serde_yaml::to_string(config)?);

    if let Ok(path) = KilnConfig::config_path() {
        println!("Config file: {}", path.display());
    }
    Ok(())
}

/// Print the default configuration file path.
pub fn config_path() -> HandlerResult {
    println!("{}", KilnConfig::config_path()?.display());
    Ok(())
}
