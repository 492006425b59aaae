//! Desired-state objects and the apply primitive
//!
//! Every write the provider makes goes through [`apply`]: a server-side apply
//! under [`FIELD_MANAGER`] with forced ownership, so a retried request
//! converges on the same object instead of failing with "already exists".

use crate::error::ApplyError;
use crate::metal_trait::MetalApi;
use crds::{IPAddressClaim, ServerClaim};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use tracing::debug;

/// Field manager identity used for every server-side apply
pub const FIELD_MANAGER: &str = "metal-provider";

/// An object the provider pushes to the control plane.
#[derive(Debug, Clone)]
pub enum DesiredObject {
    IPAddressClaim(IPAddressClaim),
    Secret(Secret),
    ServerClaim(ServerClaim),
}

impl DesiredObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IPAddressClaim(_) => "IPAddressClaim",
            Self::Secret(_) => "Secret",
            Self::ServerClaim(_) => "ServerClaim",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::IPAddressClaim(claim) => &claim.metadata,
            Self::Secret(secret) => &secret.metadata,
            Self::ServerClaim(claim) => &claim.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// `<Kind> <namespace>/<name>`, used in errors and logs
    pub fn target(&self) -> String {
        format!("{} {}/{}", self.kind(), self.namespace(), self.name())
    }
}

/// Applies `object` through `api`, surfacing any failure unchanged.
pub async fn apply(api: &dyn MetalApi, object: DesiredObject) -> Result<DesiredObject, ApplyError> {
    debug!("Applying {}", object.target());
    match api.apply(&object).await {
        Ok(()) => Ok(object),
        Err(cause) => Err(ApplyError {
            target: object.target(),
            cause,
        }),
    }
}
