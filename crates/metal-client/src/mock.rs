//! Mock MetalApi for unit testing
//!
//! Stores objects in memory and plays the part of the external IPAM
//! allocator: a claim whose pool has a [`PoolAllocation`] configured gets
//! bound after the configured number of pending reads.

use crate::error::{MetalApiError, ProviderError};
use crate::metal_trait::MetalApi;
use crate::object::DesiredObject;
use crate::provider::{ClientFactory, current_cluster_server};
use crds::{
    IPAddress, IPAddressClaim, IPAddressClaimStatus, IPAddressSpec, LocalObjectReference, ServerClaim,
};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::config::Kubeconfig;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type ObjectKey = (String, String);

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    GetIPAddressClaim,
    GetIPAddress,
    ApplyIPAddressClaim,
    ApplySecret,
    ApplyServerClaim,
}

/// Address the simulated allocator hands out for a pool.
#[derive(Debug, Clone)]
pub struct PoolAllocation {
    pub address: String,
    pub prefix: i32,
    pub gateway: Option<String>,
    /// Reads that still see the claim pending before it gets bound
    pub pending_reads: u32,
}

/// Mock control-plane handle
///
/// Clones share the same in-memory state, so a test can keep one clone for
/// assertions while the provider owns another.
#[derive(Clone)]
pub struct MockMetalApi {
    endpoint: String,
    claims: Arc<Mutex<HashMap<ObjectKey, IPAddressClaim>>>,
    addresses: Arc<Mutex<HashMap<ObjectKey, IPAddress>>>,
    secrets: Arc<Mutex<HashMap<ObjectKey, Secret>>>,
    server_claims: Arc<Mutex<HashMap<ObjectKey, ServerClaim>>>,
    pools: Arc<Mutex<HashMap<String, PoolAllocation>>>,
    pending_reads: Arc<Mutex<HashMap<ObjectKey, u32>>>,
    failures: Arc<Mutex<HashMap<MockOperation, String>>>,
    calls: Arc<Mutex<HashMap<MockOperation, usize>>>,
    applied: Arc<Mutex<Vec<String>>>,
}

impl MockMetalApi {
    /// Create a new mock client
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            claims: Arc::new(Mutex::new(HashMap::new())),
            addresses: Arc::new(Mutex::new(HashMap::new())),
            secrets: Arc::new(Mutex::new(HashMap::new())),
            server_claims: Arc::new(Mutex::new(HashMap::new())),
            pools: Arc::new(Mutex::new(HashMap::new())),
            pending_reads: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            applied: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Another handle on the same stores, reporting `endpoint`
    pub fn with_endpoint(&self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..self.clone()
        }
    }

    /// Let the simulated allocator bind claims against `pool`
    pub fn set_pool_allocation(&self, pool: &str, allocation: PoolAllocation) {
        self.pools.lock().unwrap().insert(pool.to_string(), allocation);
    }

    /// Make `operation` fail with `message` from now on
    pub fn fail_on(&self, operation: MockOperation, message: &str) {
        self.failures.lock().unwrap().insert(operation, message.to_string());
    }

    /// Add a claim to the mock store (for test setup)
    pub fn add_ip_address_claim(&self, claim: IPAddressClaim) {
        let k = key(
            claim.metadata.namespace.as_deref().unwrap_or_default(),
            claim.metadata.name.as_deref().unwrap_or_default(),
        );
        self.claims.lock().unwrap().insert(k, claim);
    }

    /// Add an address to the mock store (for test setup)
    pub fn add_ip_address(&self, address: IPAddress) {
        let k = key(
            address.metadata.namespace.as_deref().unwrap_or_default(),
            address.metadata.name.as_deref().unwrap_or_default(),
        );
        self.addresses.lock().unwrap().insert(k, address);
    }

    pub fn ip_address_claim(&self, namespace: &str, name: &str) -> Option<IPAddressClaim> {
        self.claims.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn server_claim(&self, namespace: &str, name: &str) -> Option<ServerClaim> {
        self.server_claims.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Targets of every successful apply, in order (`<Kind> <ns>/<name>`)
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// Number of successful applies of `kind`
    pub fn applied_count(&self, kind: &str) -> usize {
        let prefix = format!("{kind} ");
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|target| target.starts_with(&prefix))
            .count()
    }

    /// Number of times `operation` was called, failed calls included
    pub fn call_count(&self, operation: MockOperation) -> usize {
        self.calls.lock().unwrap().get(&operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: MockOperation) -> Result<(), MetalApiError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        match self.failures.lock().unwrap().get(&operation) {
            Some(message) => Err(MetalApiError::Api(message.clone())),
            None => Ok(()),
        }
    }

    /// Plays the allocator: binds a pending claim once its pool allows it.
    fn maybe_bind(&self, claim: &mut IPAddressClaim) {
        if claim.status.as_ref().is_some_and(|s| s.address_ref.is_set()) {
            return;
        }
        let Some(allocation) = self.pools.lock().unwrap().get(&claim.spec.pool_ref.name).cloned() else {
            return;
        };
        let namespace = claim.metadata.namespace.clone().unwrap_or_default();
        let name = claim.metadata.name.clone().unwrap_or_default();

        let mut pending_reads = self.pending_reads.lock().unwrap();
        let reads = pending_reads.entry(key(&namespace, &name)).or_insert(0);
        if *reads < allocation.pending_reads {
            *reads += 1;
            return;
        }

        let address = IPAddress {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            spec: IPAddressSpec {
                claim_ref: LocalObjectReference::new(name.clone()),
                pool_ref: claim.spec.pool_ref.clone(),
                address: allocation.address,
                prefix: allocation.prefix,
                gateway: allocation.gateway,
            },
        };
        self.addresses.lock().unwrap().insert(key(&namespace, &name), address);
        claim.status = Some(IPAddressClaimStatus {
            address_ref: LocalObjectReference::new(name),
            conditions: Vec::new(),
        });
    }
}

#[async_trait::async_trait]
impl MetalApi for MockMetalApi {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_ip_address_claim(&self, namespace: &str, name: &str) -> Result<Option<IPAddressClaim>, MetalApiError> {
        self.record(MockOperation::GetIPAddressClaim)?;
        let mut claims = self.claims.lock().unwrap();
        let Some(claim) = claims.get_mut(&key(namespace, name)) else {
            return Ok(None);
        };
        self.maybe_bind(claim);
        Ok(Some(claim.clone()))
    }

    async fn get_ip_address(&self, namespace: &str, name: &str) -> Result<Option<IPAddress>, MetalApiError> {
        self.record(MockOperation::GetIPAddress)?;
        Ok(self.addresses.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn apply(&self, object: &DesiredObject) -> Result<(), MetalApiError> {
        let k = key(object.namespace(), object.name());
        match object {
            DesiredObject::IPAddressClaim(claim) => {
                self.record(MockOperation::ApplyIPAddressClaim)?;
                let mut claims = self.claims.lock().unwrap();
                let mut desired = claim.clone();
                // Apply of the spec leaves the allocator-owned status alone.
                if let Some(existing) = claims.get(&k) {
                    desired.status = existing.status.clone();
                }
                claims.insert(k, desired);
            }
            DesiredObject::Secret(secret) => {
                self.record(MockOperation::ApplySecret)?;
                self.secrets.lock().unwrap().insert(k, secret.clone());
            }
            DesiredObject::ServerClaim(claim) => {
                self.record(MockOperation::ApplyServerClaim)?;
                self.server_claims.lock().unwrap().insert(k, claim.clone());
            }
        }
        self.applied.lock().unwrap().push(object.target());
        Ok(())
    }
}

/// Builds [`MockMetalApi`] handles named after the kubeconfig's cluster server.
#[derive(Default)]
pub struct MockClientFactory {
    failing_endpoints: Mutex<HashSet<String>>,
    builds: AtomicUsize,
    shared: Option<MockMetalApi>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built handle shares `api`'s stores, so state survives rebuilds
    pub fn sharing(api: &MockMetalApi) -> Self {
        Self {
            shared: Some(api.clone()),
            ..Self::default()
        }
    }

    /// Refuse to build clients for `endpoint`
    pub fn fail_for(&self, endpoint: &str) {
        self.failing_endpoints.lock().unwrap().insert(endpoint.to_string());
    }

    /// Number of handles built so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClientFactory for MockClientFactory {
    async fn build(&self, kubeconfig: Kubeconfig) -> Result<Arc<dyn MetalApi>, ProviderError> {
        let endpoint = current_cluster_server(&kubeconfig)
            .ok_or_else(|| ProviderError::ClientConstruction("kubeconfig has no cluster server".to_string()))?;
        if self.failing_endpoints.lock().unwrap().contains(&endpoint) {
            return Err(ProviderError::ClientConstruction(format!("cannot reach {endpoint}")));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        let api = match &self.shared {
            Some(shared) => shared.with_endpoint(endpoint),
            None => MockMetalApi::new(endpoint),
        };
        Ok(Arc::new(api))
    }
}
