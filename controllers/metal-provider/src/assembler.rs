//! Boot configuration assembly
//!
//! Pure functions: merge the allocated address fragments into the machine
//! metadata and gather everything the Ignition renderer needs.

use crate::api::ProviderSpec;
use crate::error::DriverError;
use k8s_openapi::api::core::v1::Secret;
use serde_json::{Map, Value};

/// Key of the raw first-boot payload in the machine secret
pub const USER_DATA_KEY: &str = "userData";

/// Deep-merges `fragments` into a copy of `base`, in order.
///
/// Later fragments win on overlapping leaves; nested objects are merged
/// recursively.
pub fn compose(base: &Map<String, Value>, fragments: &[Map<String, Value>]) -> Map<String, Value> {
    let mut composed = base.clone();
    for fragment in fragments {
        ignition::deep_merge(&mut composed, fragment);
    }
    composed
}

/// Renderer input for `machine_name`.
pub fn build_artifact_input(
    machine_name: &str,
    secret: &Secret,
    metadata: Map<String, Value>,
    spec: &ProviderSpec,
) -> Result<ignition::Config, DriverError> {
    let user_data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(USER_DATA_KEY))
        .ok_or_else(|| DriverError::MissingPayload {
            secret: secret_key(secret),
        })?;

    Ok(ignition::Config {
        hostname: machine_name.to_string(),
        user_data: user_data.0.clone(),
        metadata,
        ignition: spec.ignition.clone(),
        dns_servers: spec.dns_servers.clone(),
        ignition_override: spec.ignition_override,
    })
}

fn secret_key(secret: &Secret) -> String {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    match secret.metadata.namespace.as_deref() {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_string(),
    }
}
