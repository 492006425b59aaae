//! IPAddress CRD
//!
//! A concrete address handed out by the IPAM allocator for one claim.

use crate::references::{LocalObjectReference, TypedLocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddress",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressSpec {
    /// Claim this address was allocated for
    pub claim_ref: LocalObjectReference,

    /// Pool the address was drawn from
    pub pool_ref: TypedLocalObjectReference,

    /// The address itself, without prefix length
    pub address: String,

    /// Prefix length of the network
    pub prefix: i32,

    /// Gateway of the network (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}
