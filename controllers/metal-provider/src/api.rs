//! Request and provider spec types
//!
//! The provider spec is carried as raw JSON inside the machine class and
//! decoded by the driver once the provider name has been checked.

use k8s_openapi::api::core::v1::Secret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name this driver answers to in `MachineClass::provider`
pub const PROVIDER_NAME: &str = "ironcore-metal";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMachineRequest {
    #[serde(default)]
    pub machine: Option<Machine>,
    #[serde(default)]
    pub machine_class: Option<MachineClass>,
    /// Machine secret; `data.userData` carries the raw first-boot payload
    #[serde(default)]
    pub secret: Option<Secret>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineClass {
    pub provider: String,
    /// Undecoded [`ProviderSpec`]
    #[serde(default)]
    pub provider_spec: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMachineResponse {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    pub node_name: String,
}

/// Provider-specific part of a machine class.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// OS image the server boots
    #[serde(default)]
    pub image: String,

    /// Extra Ignition fragment (JSON or YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition: Option<String>,

    /// Let `ignition` win conflicts with the generated document
    #[serde(default)]
    pub ignition_override: bool,

    /// Labels a server must carry to be claimed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub server_labels: BTreeMap<String, String>,

    /// Labels put on the ServerClaim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,

    /// Base machine metadata; allocated addresses are merged on top
    #[serde(default, alias = "metaData", skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipam_config: Vec<IPAMConfig>,
}

/// One network the machine needs an address on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IPAMConfig {
    /// Key the resolved address is stored under in the machine metadata
    pub metadata_key: String,

    /// Pool to claim the address from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_ref: Option<IPAMObjectReference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IPAMObjectReference {
    pub name: String,
    #[serde(default)]
    pub api_group: String,
    pub kind: String,
}
