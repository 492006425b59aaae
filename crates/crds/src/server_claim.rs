//! ServerClaim CRD
//!
//! Reserves a physical server matching a label selector and points it at the
//! secret holding its first-boot configuration.

use crate::references::{LabelSelector, LocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the metal-operator types
pub const METAL_API_GROUP: &str = "metal.ironcore.dev";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.ironcore.dev",
    version = "v1alpha1",
    kind = "ServerClaim",
    namespaced,
    status = "ServerClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimSpec {
    /// Desired power state of the claimed server
    pub power: Power,

    /// Explicit server to claim (optional, selector is used otherwise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<LocalObjectReference>,

    /// Labels the claimed server must carry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selector: Option<LabelSelector>,

    /// Secret holding the Ignition document under the `ignition` key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_secret_ref: Option<LocalObjectReference>,

    /// OS image to boot
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum Power {
    #[default]
    On,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimStatus {
    /// "Bound" once a server has been attached, "Unbound" otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}
