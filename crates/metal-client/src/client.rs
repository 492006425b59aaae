//! Kubernetes-backed control-plane handle

use crate::error::{MetalApiError, ProviderError};
use crate::metal_trait::MetalApi;
use crate::object::{DesiredObject, FIELD_MANAGER};
use crate::provider::ClientFactory;
use crds::{IPAddress, IPAddressClaim};
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::NamespaceResourceScope;
use kube::{Client, Config, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// [`MetalApi`] over a `kube::Client`.
#[derive(Clone)]
pub struct KubeMetalApi {
    client: Client,
    endpoint: String,
}

impl KubeMetalApi {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn server_side_apply<K>(&self, object: &K) -> Result<(), MetalApiError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        K::DynamicType: Default,
    {
        let meta = object.meta();
        let name = meta
            .name
            .as_deref()
            .ok_or_else(|| MetalApiError::Api("object to apply has no name".to_string()))?;
        let namespace = meta
            .namespace
            .as_deref()
            .ok_or_else(|| MetalApiError::Api(format!("object {name} to apply has no namespace")))?;

        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(object)).await?;
        debug!("Server-side applied {}/{}", namespace, name);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetalApi for KubeMetalApi {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_ip_address_claim(&self, namespace: &str, name: &str) -> Result<Option<IPAddressClaim>, MetalApiError> {
        let api: Api<IPAddressClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_ip_address(&self, namespace: &str, name: &str) -> Result<Option<IPAddress>, MetalApiError> {
        let api: Api<IPAddress> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply(&self, object: &DesiredObject) -> Result<(), MetalApiError> {
        match object {
            DesiredObject::IPAddressClaim(claim) => self.server_side_apply(claim).await,
            DesiredObject::Secret(secret) => self.server_side_apply(secret).await,
            DesiredObject::ServerClaim(claim) => self.server_side_apply(claim).await,
        }
    }
}

/// Builds [`KubeMetalApi`] handles from a parsed kubeconfig.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeClientFactory;

#[async_trait::async_trait]
impl ClientFactory for KubeClientFactory {
    async fn build(&self, kubeconfig: Kubeconfig) -> Result<Arc<dyn MetalApi>, ProviderError> {
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ProviderError::ClientConstruction(format!("unable to get metal cluster rest config: {e}")))?;
        let endpoint = config.cluster_url.to_string();
        let client = Client::try_from(config)
            .map_err(|e| ProviderError::ClientConstruction(format!("unable to build client for {endpoint}: {e}")))?;
        Ok(Arc::new(KubeMetalApi::new(client, endpoint)))
    }
}
