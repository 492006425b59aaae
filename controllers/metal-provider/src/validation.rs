//! Provider spec and machine secret validation
//!
//! Collects every problem instead of stopping at the first one, so a broken
//! machine class can be fixed in one round trip.

use crate::api::ProviderSpec;
use crds::IPAM_API_GROUP;
use k8s_openapi::api::core::v1::Secret;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

/// One invalid field, addressed by its path below `providerSpec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub detail: String,
}

impl FieldError {
    fn new(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.detail)
    }
}

pub fn validate_provider_spec_and_secret(spec: &ProviderSpec, secret: &Secret) -> Vec<FieldError> {
    let mut errors = Vec::new();
    validate_secret(secret, &mut errors);
    validate_provider_spec(spec, "providerSpec", &mut errors);
    errors
}

fn validate_secret(secret: &Secret, errors: &mut Vec<FieldError>) {
    if secret.data.is_none() {
        errors.push(FieldError::new("secret.data", "secret data is required"));
    }
}

fn validate_provider_spec(spec: &ProviderSpec, path: &str, errors: &mut Vec<FieldError>) {
    if spec.image.is_empty() {
        errors.push(FieldError::new(format!("{path}.image"), "image is required"));
    }

    for (i, server) in spec.dns_servers.iter().enumerate() {
        if server.parse::<IpAddr>().is_err() {
            errors.push(FieldError::new(
                format!("{path}.dnsServers[{i}]"),
                format!("ip is invalid: {server}"),
            ));
        }
    }

    let mut seen_keys = HashSet::new();
    for (i, network) in spec.ipam_config.iter().enumerate() {
        let entry = format!("{path}.ipamConfig[{i}]");
        if network.metadata_key.is_empty() {
            errors.push(FieldError::new(format!("{entry}.metadataKey"), "metadataKey is required"));
        } else if !seen_keys.insert(network.metadata_key.as_str()) {
            errors.push(FieldError::new(
                format!("{entry}.metadataKey"),
                format!("duplicate metadataKey: {}", network.metadata_key),
            ));
        }

        // A missing ipamRef is only an error once the claim has to be created.
        let Some(ipam_ref) = &network.ipam_ref else {
            continue;
        };
        if ipam_ref.name.is_empty() {
            errors.push(FieldError::new(format!("{entry}.ipamRef.name"), "name is required"));
        }
        if ipam_ref.kind.is_empty() {
            errors.push(FieldError::new(format!("{entry}.ipamRef.kind"), "kind is required"));
        }
        if ipam_ref.api_group != IPAM_API_GROUP {
            errors.push(FieldError::new(
                format!("{entry}.ipamRef.apiGroup"),
                format!("unsupported apiGroup {:?}, expected {IPAM_API_GROUP}", ipam_ref.api_group),
            ));
        }
    }
}
