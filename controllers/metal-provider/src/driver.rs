//! Machine provisioning driver
//!
//! `create_machine` runs the whole provisioning sequence for one request:
//!
//! 1. Check the request shape and the provider name
//! 2. Decode and validate the provider spec and machine secret
//! 3. Allocate an address for every configured network
//! 4. Compose the machine metadata and render the Ignition document
//! 5. Apply the Ignition secret, then the ServerClaim referencing it
//!
//! Each step commits on its own and nothing is rolled back on failure.
//! Every write is a server-side apply, so repeating a request converges on
//! the same objects.

use crate::allocator::{NetworkAllocator, bounded_name};
use crate::api::{CreateMachineRequest, CreateMachineResponse, PROVIDER_NAME, ProviderSpec};
use crate::assembler::{build_artifact_input, compose};
use crate::config::PollConfig;
use crate::error::DriverError;
use crate::validation::validate_provider_spec_and_secret;
use crds::{LabelSelector, LocalObjectReference, Power, ServerClaim, ServerClaimSpec};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use metal_client::{ApplyError, ClientProvider, DesiredObject, apply};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Data key of the rendered document in the Ignition secret
pub const IGNITION_DATA_KEY: &str = "ignition";

pub struct Driver {
    provider: Arc<ClientProvider>,
    namespace: String,
    poll: PollConfig,
}

impl Driver {
    pub fn new(provider: Arc<ClientProvider>, namespace: impl Into<String>, poll: PollConfig) -> Self {
        Self {
            provider,
            namespace: namespace.into(),
            poll,
        }
    }

    /// Namespace in the metal cluster all objects are written to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn create_machine(
        &self,
        request: &CreateMachineRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateMachineResponse, DriverError> {
        let (Some(machine), Some(class), Some(secret)) = (&request.machine, &request.machine_class, &request.secret)
        else {
            return Err(DriverError::InvalidArgument("received empty request".to_string()));
        };
        if class.provider != PROVIDER_NAME {
            return Err(DriverError::InvalidArgument(format!(
                "requested provider '{}' is not supported by the driver '{}'",
                class.provider, PROVIDER_NAME
            )));
        }

        info!("Machine creation request has been received for {}", machine.name);

        let spec: ProviderSpec = serde_json::from_value(class.provider_spec.clone())
            .map_err(|e| DriverError::Configuration(format!("failed to decode provider spec: {e}")))?;
        let field_errors = validate_provider_spec_and_secret(&spec, secret);
        if !field_errors.is_empty() {
            let details: Vec<String> = field_errors.iter().map(ToString::to_string).collect();
            return Err(DriverError::Configuration(format!(
                "failed to validate provider spec and secret: [{}]",
                details.join(", ")
            )));
        }

        let fragments = {
            let client = self.provider.acquire();
            NetworkAllocator::new(&*client, &self.namespace, self.poll, cancel)
                .allocate_all(&machine.name, &spec.ipam_config)
                .await?
        };
        debug!("Allocated {} network(s) for {}", fragments.len(), machine.name);

        let metadata = compose(&spec.metadata, &fragments);
        let input = build_artifact_input(&machine.name, secret, metadata, &spec)?;
        let document = ignition::render(&input).map_err(|source| DriverError::Render {
            machine: machine.name.clone(),
            source,
        })?;

        let ignition_secret = self.ignition_secret(&machine.name, document);
        let server_claim = self.server_claim(&machine.name, &spec, &ignition_secret);

        let client = self.provider.acquire();
        with_cancel(cancel, &machine.name, apply(&*client, DesiredObject::Secret(ignition_secret))).await??;
        let applied = with_cancel(cancel, &machine.name, apply(&*client, DesiredObject::ServerClaim(server_claim))).await??;

        let node_name = applied.name().to_string();
        let response = CreateMachineResponse {
            provider_id: provider_id(&self.namespace, &node_name),
            node_name,
        };
        info!("Machine creation request has been processed for {}", machine.name);
        Ok(response)
    }

    fn ignition_secret(&self, machine: &str, document: String) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(ignition_secret_name(machine)),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                IGNITION_DATA_KEY.to_string(),
                ByteString(document.into_bytes()),
            )])),
            ..Default::default()
        }
    }

    fn server_claim(&self, machine: &str, spec: &ProviderSpec, ignition_secret: &Secret) -> ServerClaim {
        let mut claim = ServerClaim::new(
            machine,
            ServerClaimSpec {
                power: Power::On,
                server_ref: None,
                server_selector: Some(LabelSelector {
                    match_labels: spec.server_labels.clone(),
                }),
                ignition_secret_ref: Some(LocalObjectReference::new(
                    ignition_secret.metadata.name.clone().unwrap_or_default(),
                )),
                image: spec.image.clone(),
            },
        );
        claim.metadata.namespace = Some(self.namespace.clone());
        if !spec.labels.is_empty() {
            claim.metadata.labels = Some(spec.labels.clone());
        }
        claim
    }
}

/// Name of the secret holding `machine`'s Ignition document, bounded like claim names.
pub fn ignition_secret_name(machine: &str) -> String {
    bounded_name("Ignition secret", format!("{machine}-{IGNITION_DATA_KEY}"))
}

/// `ironcore-metal://<namespace>/<server claim>`
pub fn provider_id(namespace: &str, server_claim: &str) -> String {
    format!("{PROVIDER_NAME}://{namespace}/{server_claim}")
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    machine: &str,
    future: impl Future<Output = Result<T, ApplyError>>,
) -> Result<Result<T, ApplyError>, DriverError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DriverError::Cancelled(format!("creation of machine {machine} was cancelled"))),
        output = future => Ok(output),
    }
}
