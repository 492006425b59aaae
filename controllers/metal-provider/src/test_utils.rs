//! Test utilities for unit testing the driver
//!
//! This module provides helpers for creating requests and a driver wired to
//! the in-memory metal API.

use crate::api::{CreateMachineRequest, IPAMConfig, IPAMObjectReference, Machine, MachineClass, PROVIDER_NAME};
use crate::config::PollConfig;
use crate::driver::Driver;
use crds::{
    IPAM_API_GROUP, IPAddress, IPAddressClaim, IPAddressClaimSpec, IPAddressClaimStatus, IPAddressSpec,
    LocalObjectReference, TypedLocalObjectReference,
};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use metal_client::{ClientProvider, MockClientFactory, MockMetalApi, PoolAllocation};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_NAMESPACE: &str = "metal";

/// Poll settings short enough for unit tests
pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        timeout: Duration::from_millis(100),
    }
}

/// Driver talking to `api` (clones of the mock share state)
pub fn create_test_driver(api: &MockMetalApi) -> Driver {
    let provider = ClientProvider::with_client(
        "/nonexistent/kubeconfig",
        Arc::new(MockClientFactory::new()),
        Arc::new(api.clone()),
    );
    Driver::new(Arc::new(provider), TEST_NAMESPACE, fast_poll())
}

/// Kubeconfig pointing at `server` with [`TEST_NAMESPACE`] as its namespace
pub fn metal_kubeconfig(server: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
current-context: metal
clusters:
- name: metal
  cluster:
    server: {server}
contexts:
- name: metal
  context:
    cluster: metal
    user: provider
    namespace: {TEST_NAMESPACE}
users:
- name: provider
  user:
    token: abc
"#
    )
}

pub fn pool_ref(name: &str) -> IPAMObjectReference {
    IPAMObjectReference {
        name: name.to_string(),
        api_group: IPAM_API_GROUP.to_string(),
        kind: "GlobalInClusterIPPool".to_string(),
    }
}

pub fn network(metadata_key: &str, pool: &str) -> IPAMConfig {
    IPAMConfig {
        metadata_key: metadata_key.to_string(),
        ipam_ref: Some(pool_ref(pool)),
    }
}

/// Allocation the mock IPAM hands out after `pending_reads` pending reads
pub fn allocation(address: &str, prefix: i32, gateway: &str, pending_reads: u32) -> PoolAllocation {
    PoolAllocation {
        address: address.to_string(),
        prefix,
        gateway: Some(gateway.to_string()),
        pending_reads,
    }
}

pub fn create_test_secret(user_data: Option<&str>) -> Secret {
    match user_data {
        Some(payload) => create_test_secret_bytes(payload.as_bytes()),
        None => machine_secret(BTreeMap::new()),
    }
}

/// Machine secret whose `userData` holds arbitrary bytes
pub fn create_test_secret_bytes(user_data: &[u8]) -> Secret {
    machine_secret(BTreeMap::from([(
        "userData".to_string(),
        ByteString(user_data.to_vec()),
    )]))
}

fn machine_secret(data: BTreeMap<String, ByteString>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("machine-secret".to_string()),
            namespace: Some("shoot".to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Provider spec with one `eth0` network on `pool-a`
pub fn create_test_provider_spec() -> Value {
    json!({
        "image": "gardenlinux:1443.3",
        "serverLabels": {"instance-type": "bx2-metal"},
        "labels": {"shoot": "ci"},
        "dnsServers": ["1.1.1.1"],
        "metadata": {"foo": "bar"},
        "ipamConfig": [
            {
                "metadataKey": "eth0",
                "ipamRef": {
                    "apiGroup": IPAM_API_GROUP,
                    "kind": "GlobalInClusterIPPool",
                    "name": "pool-a"
                }
            }
        ]
    })
}

pub fn create_test_request(machine: &str, provider: &str, provider_spec: Value) -> CreateMachineRequest {
    CreateMachineRequest {
        machine: Some(Machine {
            name: machine.to_string(),
        }),
        machine_class: Some(MachineClass {
            provider: provider.to_string(),
            provider_spec,
        }),
        secret: Some(create_test_secret(Some("#cloud-config\nruncmd: []\n"))),
    }
}

/// Well-formed request for `machine` using [`create_test_provider_spec`]
pub fn create_valid_request(machine: &str) -> CreateMachineRequest {
    create_test_request(machine, PROVIDER_NAME, create_test_provider_spec())
}

/// Claim already bound to the address of the same name
pub fn create_bound_claim(name: &str, pool: &str) -> IPAddressClaim {
    let mut claim = IPAddressClaim::new(
        name,
        IPAddressClaimSpec {
            pool_ref: TypedLocalObjectReference::new(IPAM_API_GROUP, "GlobalInClusterIPPool", pool),
        },
    );
    claim.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    claim.status = Some(IPAddressClaimStatus {
        address_ref: LocalObjectReference::new(name),
        conditions: Vec::new(),
    });
    claim
}

pub fn create_test_ip_address(name: &str, pool: &str, address: &str, prefix: i32, gateway: Option<&str>) -> IPAddress {
    let mut ip = IPAddress::new(
        name,
        IPAddressSpec {
            claim_ref: LocalObjectReference::new(name),
            pool_ref: TypedLocalObjectReference::new(IPAM_API_GROUP, "GlobalInClusterIPPool", pool),
            address: address.to_string(),
            prefix,
            gateway: gateway.map(ToString::to_string),
        },
    );
    ip.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    ip
}
