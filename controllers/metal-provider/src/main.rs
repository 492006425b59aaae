//! Metal Machine Provider
//!
//! Provisions bare-metal machines on an ironcore metal cluster:
//! - IPAddressClaim: one per configured network, bound by cluster-api IPAM
//! - Secret: the machine's rendered Ignition document
//! - ServerClaim: reserves a matching server and boots it with that document
//!
//! Reads one create request as JSON, prints the response as JSON.

mod allocator;
mod api;
mod assembler;
mod config;
mod driver;
mod error;
mod validation;

#[cfg(test)]
mod test_utils;
mod driver_test;

use crate::api::CreateMachineRequest;
use crate::config::DriverConfig;
use crate::driver::Driver;
use crate::error::DriverError;
use metal_client::{ClientProvider, KubeClientFactory, ProviderError};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DriverError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Both ring and aws-lc-rs can end up in the dependency graph.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Metal Machine Provider");

    let config = DriverConfig::from_env()?;
    info!("Configuration:");
    info!("  Kubeconfig: {}", config.kubeconfig_path.display());
    info!("  IP claim poll interval: {:?}", config.poll.interval);
    info!("  IP claim poll timeout: {:?}", config.poll.timeout);

    let shutdown = CancellationToken::new();
    let (provider, namespace, mut watcher) =
        ClientProvider::new_with_namespace(&config.kubeconfig_path, Arc::new(KubeClientFactory), shutdown.clone())
            .await?;

    let request = read_request(config.request_path.as_deref()).await?;
    let driver = Driver::new(provider, namespace, config.poll);
    info!("  Metal namespace: {}", driver.namespace());

    let cancel = shutdown.child_token();
    let result = tokio::select! {
        result = driver.create_machine(&request, &cancel) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, cancelling machine creation");
            Err(DriverError::Cancelled("interrupted".to_string()))
        }
        watch = watcher.wait() => {
            let e = watch.err().unwrap_or_else(|| ProviderError::Watch("credential watcher stopped".to_string()));
            error!("Credential watcher failed: {}", e);
            Err(e.into())
        }
    };
    shutdown.cancel();

    let response = result.inspect_err(|e| error!("Machine creation failed ({:?}): {}", e.code(), e))?;
    let output = serde_json::to_string_pretty(&response)
        .map_err(|e| DriverError::Configuration(format!("failed to encode response: {e}")))?;
    println!("{output}");
    Ok(())
}

/// Reads the create request from `path`, or from stdin when no path is set.
async fn read_request(path: Option<&Path>) -> Result<CreateMachineRequest, DriverError> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            DriverError::Configuration(format!("failed to read create request {}: {e}", path.display()))
        })?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .map_err(|e| DriverError::Configuration(format!("failed to read create request from stdin: {e}")))?;
            raw
        }
    };
    serde_json::from_str(&raw).map_err(|e| DriverError::InvalidArgument(format!("malformed create request: {e}")))
}
