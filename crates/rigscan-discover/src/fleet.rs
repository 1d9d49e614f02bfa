//! Bulk operations across many devices.
//!
//! One tokio task per device, with a semaphore bounding how many talk to
//! the network at once. Results come back in input order.

use std::net::Ipv4Addr;
use std::sync::Arc;

use rigscan_api::Parameter;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{DiscoverError, Result};
use crate::identity::MinerIdentity;

/// Per-device outcome of a bulk operation.
pub type FleetResult = (Ipv4Addr, Result<Value>);

async fn fan_out<F, Fut>(miners: &[Arc<MinerIdentity>], concurrency: usize, op: F) -> Vec<FleetResult>
where
    F: Fn(Arc<MinerIdentity>) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(miners.len());

    for miner in miners {
        let miner = miner.clone();
        let semaphore = semaphore.clone();
        let op = op.clone();
        let ip = miner.address();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("Semaphore closed");
            op(miner).await
        });
        handles.push((ip, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (ip, handle) in handles {
        match handle.await {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::warn!(ip = %ip, error = %e, "Bulk operation failed");
                }
                results.push((ip, result));
            }
            Err(e) => {
                tracing::error!(ip = %ip, error = %e, "Bulk operation task panicked");
                results.push((ip, Err(DiscoverError::Task(e.to_string()))));
            }
        }
    }
    results
}

/// Send one command to every device.
pub async fn bulk_command(
    miners: &[Arc<MinerIdentity>],
    command: &str,
    parameter: Option<Parameter>,
    ignore_errors: bool,
    concurrency: usize,
) -> Vec<FleetResult> {
    tracing::info!(devices = miners.len(), command, "Sending bulk command");
    let command = command.to_string();
    fan_out(miners, concurrency, move |miner| {
        let command = command.clone();
        let parameter = parameter.clone();
        async move {
            let adapter = miner
                .adapter()
                .ok_or(DiscoverError::Unclassified(miner.address()))?;
            Ok(adapter.send_command(&command, parameter, ignore_errors).await?)
        }
    })
    .await
}

/// Push one configuration object to every device.
pub async fn bulk_send_config(
    miners: &[Arc<MinerIdentity>],
    config: &Value,
    concurrency: usize,
) -> Vec<FleetResult> {
    tracing::info!(devices = miners.len(), "Pushing configuration");
    let config = Arc::new(config.clone());
    fan_out(miners, concurrency, move |miner| {
        let config = config.clone();
        async move {
            let adapter = miner
                .adapter()
                .ok_or(DiscoverError::Unclassified(miner.address()))?;
            Ok(adapter.send_config(&config).await?)
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unclassified_devices_fail_individually() {
        let miners = vec![
            Arc::new(MinerIdentity::unknown(Ipv4Addr::new(10, 0, 0, 1), 4028)),
            Arc::new(MinerIdentity::unknown(Ipv4Addr::new(10, 0, 0, 2), 4028)),
        ];
        let results = bulk_command(&miners, "summary", None, false, 1).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, Ipv4Addr::new(10, 0, 0, 1));
        for (ip, result) in &results {
            assert!(matches!(result, Err(DiscoverError::Unclassified(addr)) if addr == ip));
        }
    }
}
