//! IPAddressClaim CRD
//!
//! Requests an IP address from a pool. Created by the provider, bound by an
//! external IPAM allocator which fills in `status.addressRef`.

use crate::references::{LocalObjectReference, TypedLocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the cluster-api IPAM types
pub const IPAM_API_GROUP: &str = "ipam.cluster.x-k8s.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddressClaim",
    namespaced,
    status = "IPAddressClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimSpec {
    /// Pool the address should be drawn from
    pub pool_ref: TypedLocalObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimStatus {
    /// IPAddress bound to this claim; empty while pending
    #[serde(default)]
    pub address_ref: LocalObjectReference,

    /// Conditions reported by the allocator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClaimCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCondition {
    /// Condition type, e.g. "Ready"
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Binding state of a claim as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimBinding {
    /// Created but the allocator has not attached an address yet
    Pending,
    /// Bound to the named IPAddress
    Bound(String),
}

impl IPAddressClaim {
    /// Current binding, derived from `status.addressRef`.
    pub fn binding(&self) -> ClaimBinding {
        match &self.status {
            Some(status) if status.address_ref.is_set() => {
                ClaimBinding::Bound(status.address_ref.name.clone())
            }
            _ => ClaimBinding::Pending,
        }
    }
}
