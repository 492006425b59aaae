//! Metal control-plane client
//!
//! Access layer between the provisioning engine and the metal cluster's API
//! server:
//!
//! - [`ClientProvider`]: owns the live handle and rebuilds it when the
//!   kubeconfig is rotated on disk
//! - [`MetalApi`]: the operations the engine needs (claim and address reads,
//!   server-side apply), implemented by [`KubeMetalApi`]
//! - [`apply`]: idempotent create-or-update of a [`DesiredObject`]
//!
//! # Example
//!
//! ```no_run
//! use metal_client::{ClientProvider, KubeClientFactory};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let shutdown = CancellationToken::new();
//! let (provider, namespace, _watcher) = ClientProvider::new_with_namespace(
//!     "/etc/metal/kubeconfig",
//!     Arc::new(KubeClientFactory),
//!     shutdown.clone(),
//! )
//! .await?;
//!
//! let client = provider.acquire();
//! let claim = client.get_ip_address_claim(&namespace, "m1-eth0").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod object;
pub mod provider;
#[path = "trait.rs"]
pub mod metal_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{KubeClientFactory, KubeMetalApi};
pub use error::{ApplyError, MetalApiError, ProviderError};
pub use metal_trait::MetalApi;
pub use object::{DesiredObject, FIELD_MANAGER, apply};
pub use provider::{ClientFactory, ClientLease, ClientProvider, CredentialWatcher};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClientFactory, MockMetalApi, MockOperation, PoolAllocation};
