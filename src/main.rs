//! # resilient-client - Command Line Entry Point
//!
//! Fetches each endpoint given on the command line through the full client
//! stack (cache, deduplication, retries, interceptors) and prints a JSON
//! report with per-endpoint results, metrics and cache statistics.
//!
//! ```text
//! CLIENT_CONFIG=config/client.yaml resilient-client /products /news https://example.com/x
//! ```
//!
//! Environment:
//! - `CLIENT_CONFIG`: optional YAML/JSON/TOML configuration file
//! - `CLIENT_CONCURRENCY`: window size for the fetches (default 4)
//! - `CLIENT_*` overrides and `RUST_LOG` as documented on `ClientConfig`

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{info, warn};

use resilient_client::observability::init_logging;
use resilient_client::{BatchRequest, Client, ClientConfig, ClientResult, RequestIdInterceptor};

const DEFAULT_CONCURRENCY: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    info!("🚀 Starting resilient-client {}", env!("CARGO_PKG_VERSION"));

    let endpoints: Vec<String> = std::env::args().skip(1).collect();
    if endpoints.is_empty() {
        eprintln!("usage: resilient-client <endpoint>...");
        return Ok(());
    }

    let concurrency = match std::env::var("CLIENT_CONCURRENCY") {
        Ok(value) => value
            .parse::<usize>()
            .with_context(|| format!("invalid CLIENT_CONCURRENCY {:?}", value))?,
        Err(_) => DEFAULT_CONCURRENCY,
    };

    let client = Client::with_reqwest(config)?;
    client.add_interceptor(RequestIdInterceptor);

    let requests: Vec<BatchRequest> = endpoints.iter().map(BatchRequest::get).collect();

    let results = tokio::select! {
        results = client.request_with_concurrency::<Value>(requests, concurrency) => results,
        _ = tokio::signal::ctrl_c() => {
            warn!("📡 Received Ctrl+C, cancelling in-flight requests");
            client.close();
            return Ok(());
        }
    };

    let report = build_report(&client, &endpoints, results);
    println!("{}", serde_json::to_string_pretty(&report)?);

    client.close();
    info!("✅ Done");
    Ok(())
}

/// Configuration from `CLIENT_CONFIG` if set, otherwise defaults plus env overrides
async fn load_config() -> anyhow::Result<ClientConfig> {
    match std::env::var("CLIENT_CONFIG") {
        Ok(path) => ClientConfig::load_from_file(&path)
            .await
            .with_context(|| format!("failed to load configuration from {}", path)),
        Err(_) => {
            let mut config = ClientConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

fn build_report(client: &Client, endpoints: &[String], results: Vec<ClientResult<Value>>) -> Value {
    let entries: Vec<Value> = endpoints
        .iter()
        .zip(results)
        .map(|(endpoint, result)| match result {
            Ok(data) => json!({ "endpoint": endpoint, "ok": true, "data": data }),
            Err(error) => json!({
                "endpoint": endpoint,
                "ok": false,
                "error": error.to_string(),
                "error_type": error.error_type(),
                "status": error.status(),
            }),
        })
        .collect();

    json!({
        "fetched_at": chrono::Utc::now().to_rfc3339(),
        "results": entries,
        "metrics": client.performance().get_metrics(),
        "cache": client.cache().get_stats(),
    })
}
