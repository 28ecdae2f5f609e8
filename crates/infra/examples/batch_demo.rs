//! Example: running a batch against a flaky remote service
//!
//! Loads configuration from the usual locations (or defaults), installs
//! logging and pushes a handful of inventory updates through a coordinator.
//!
//! ```bash
//! FARMGATE_BATCH_RETRY_DELAY_MS=50 cargo run -p farmgate-infra --example batch_demo
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use farmgate_infra::{config, init_logging, ResilienceRuntime};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct InventoryError(String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load().context("loading configuration")?;
    let _guard = init_logging(&config.logging).context("initialising logging")?;
    let runtime = ResilienceRuntime::from_config(&config)?;
    let eviction = runtime.spawn_eviction(Duration::from_secs(60));

    let coordinator = runtime.batch_coordinator()?;
    let attempts = Arc::new(AtomicU32::new(0));
    let skus = ["apple-crate", "pear-box", "plum-tray", "fig-pack"];

    let report = coordinator
        .process_batch("inventory", &skus, |sku: &&str| {
            let sku = sku.to_string();
            let attempts = Arc::clone(&attempts);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                // Every third call drops the connection
                if attempts.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
                    Err(InventoryError(format!("connection reset while updating {sku}")))
                } else {
                    Ok(sku.len())
                }
            }
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&report.metrics)?);
    for (index, result) in report.results.iter().enumerate() {
        match result {
            Ok(value) => println!("{:>12}: ok ({value})", skus[index]),
            Err(err) => println!("{:>12}: failed ({err})", skus[index]),
        }
    }
    let stats = runtime.metrics().get_stats("inventory.item_latency_ms", None);
    println!("item latency p95: {:.1}ms over {} items", stats.p95, stats.count);

    eviction.abort();
    Ok(())
}
