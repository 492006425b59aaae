//! MetalApi trait for mocking
//!
//! This trait abstracts the control-plane handle so the provisioning engine
//! can run against the in-memory mock in unit tests. [`crate::KubeMetalApi`]
//! is the production implementation.

use crate::error::MetalApiError;
use crate::object::DesiredObject;
use crds::{IPAddress, IPAddressClaim};

/// Control-plane operations used by the provisioning engine
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait MetalApi: Send + Sync {
    /// API server this handle talks to
    fn endpoint(&self) -> &str;

    /// Fetch a claim; `Ok(None)` when it does not exist
    async fn get_ip_address_claim(&self, namespace: &str, name: &str) -> Result<Option<IPAddressClaim>, MetalApiError>;

    /// Fetch an address; `Ok(None)` when it does not exist
    async fn get_ip_address(&self, namespace: &str, name: &str) -> Result<Option<IPAddress>, MetalApiError>;

    /// Server-side apply with forced ownership
    async fn apply(&self, object: &DesiredObject) -> Result<(), MetalApiError>;
}
