//! Network identity allocation
//!
//! For every network a machine needs, an `IPAddressClaim` named
//! `<machine>-<metadataKey>` is looked up, created when missing, then polled
//! until the IPAM allocator binds it to an `IPAddress`. The address is
//! returned as a metadata fragment keyed by the network's metadata key.
//!
//! Networks are handled one after another and the first failure aborts the
//! whole allocation. Claims created before the failure are left in place; a
//! retried request picks them up again by name.

use crate::api::IPAMConfig;
use crate::config::PollConfig;
use crate::error::AllocationError;
use crds::{ClaimBinding, IPAddressClaim, IPAddressClaimSpec, TypedLocalObjectReference};
use metal_client::{DesiredObject, MetalApi, apply};
use serde_json::{Map, Value, json};
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest object name the API server accepts (DNS-1123 subdomain)
pub const MAX_NAME_LENGTH: usize = 253;

/// Claim name for one network of a machine.
///
/// Names over [`MAX_NAME_LENGTH`] bytes are cut down to it, so two long
/// machine/key pairs sharing the same first 253 bytes end up on the same
/// claim.
pub fn claim_name(machine: &str, metadata_key: &str) -> String {
    bounded_name("IP address claim", format!("{machine}-{metadata_key}"))
}

/// Cuts `name` to [`MAX_NAME_LENGTH`] bytes on a char boundary.
pub fn bounded_name(kind: &str, mut name: String) -> String {
    if name.len() > MAX_NAME_LENGTH {
        warn!(
            "{} name {} is too long, it will be shortened which can cause name collisions",
            kind, name
        );
        let mut cut = MAX_NAME_LENGTH;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// Allocates addresses for one request, on one client handle.
pub struct NetworkAllocator<'a> {
    client: &'a dyn MetalApi,
    namespace: &'a str,
    poll: PollConfig,
    cancel: &'a CancellationToken,
}

impl<'a> NetworkAllocator<'a> {
    pub fn new(
        client: &'a dyn MetalApi,
        namespace: &'a str,
        poll: PollConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            namespace,
            poll,
            cancel,
        }
    }

    /// One metadata fragment per network, in input order.
    pub async fn allocate_all(
        &self,
        machine: &str,
        networks: &[IPAMConfig],
    ) -> Result<Vec<Map<String, Value>>, AllocationError> {
        let mut fragments = Vec::with_capacity(networks.len());
        for network in networks {
            fragments.push(self.allocate(machine, network).await?);
        }
        Ok(fragments)
    }

    pub async fn allocate(&self, machine: &str, network: &IPAMConfig) -> Result<Map<String, Value>, AllocationError> {
        let name = claim_name(machine, &network.metadata_key);

        let existing = self
            .cancellable(&name, self.client.get_ip_address_claim(self.namespace, &name))
            .await?
            .map_err(|source| AllocationError::Lookup {
                claim: name.clone(),
                source,
            })?;

        let address_name = match existing.as_ref().map(IPAddressClaim::binding) {
            Some(ClaimBinding::Bound(address)) => {
                debug!("IP address claim {}/{} already bound to {}", self.namespace, name, address);
                address
            }
            Some(ClaimBinding::Pending) => {
                debug!("IP address claim {}/{} found, waiting for it to be bound", self.namespace, name);
                self.wait_for_binding(&name).await?
            }
            None => {
                self.create_claim(&name, network).await?;
                self.wait_for_binding(&name).await?
            }
        };

        self.resolve(&name, &address_name, &network.metadata_key).await
    }

    async fn create_claim(&self, name: &str, network: &IPAMConfig) -> Result<(), AllocationError> {
        let pool = network
            .ipam_ref
            .as_ref()
            .ok_or_else(|| AllocationError::MissingPoolSelector {
                claim: name.to_string(),
            })?;

        info!("Creating IP address claim {}/{} from pool {}", self.namespace, name, pool.name);
        let mut claim = IPAddressClaim::new(
            name,
            IPAddressClaimSpec {
                pool_ref: TypedLocalObjectReference::new(&pool.api_group, &pool.kind, &pool.name),
            },
        );
        claim.metadata.namespace = Some(self.namespace.to_string());

        self.cancellable(name, apply(self.client, DesiredObject::IPAddressClaim(claim)))
            .await?
            .map_err(|source| AllocationError::Create {
                claim: name.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Polls the claim until it is bound; the first check is immediate.
    async fn wait_for_binding(&self, name: &str) -> Result<String, AllocationError> {
        let deadline = Instant::now() + self.poll.timeout;
        loop {
            let claim = self
                .cancellable(name, self.client.get_ip_address_claim(self.namespace, name))
                .await?
                .map_err(|source| AllocationError::Poll {
                    claim: name.to_string(),
                    source,
                })?;

            match claim.as_ref().map(IPAddressClaim::binding) {
                Some(ClaimBinding::Bound(address)) => {
                    info!("IP address claim {}/{} bound to {}", self.namespace, name, address);
                    return Ok(address);
                }
                Some(ClaimBinding::Pending) => {}
                None => debug!("IP address claim {}/{} not visible yet", self.namespace, name),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AllocationError::Timeout {
                    claim: name.to_string(),
                    timeout: self.poll.timeout,
                });
            }
            let pause = self.poll.interval.min(deadline - now);
            self.cancellable(name, tokio::time::sleep(pause)).await?;
        }
    }

    async fn resolve(&self, claim: &str, address_name: &str, metadata_key: &str) -> Result<Map<String, Value>, AllocationError> {
        let resolution_error = |source| AllocationError::AddressResolution {
            claim: claim.to_string(),
            address: address_name.to_string(),
            source,
        };

        let address = self
            .cancellable(claim, self.client.get_ip_address(self.namespace, address_name))
            .await?
            .map_err(|e| resolution_error(Some(e)))?
            .ok_or_else(|| resolution_error(None))?;

        let mut entry = Map::new();
        entry.insert("ip".to_string(), json!(address.spec.address));
        entry.insert("prefix".to_string(), json!(address.spec.prefix));
        // Always present so consumers see the same shape on every network.
        entry.insert("gateway".to_string(), json!(address.spec.gateway.unwrap_or_default()));

        let mut fragment = Map::new();
        fragment.insert(metadata_key.to_string(), Value::Object(entry));
        Ok(fragment)
    }

    /// Races `future` against the request's cancellation.
    async fn cancellable<T>(&self, claim: &str, future: impl Future<Output = T>) -> Result<T, AllocationError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AllocationError::Cancelled { claim: claim.to_string() }),
            output = future => Ok(output),
        }
    }
}
