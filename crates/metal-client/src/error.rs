//! Metal client errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by a control-plane handle
#[derive(Debug, Error)]
pub enum MetalApiError {
    /// Kubernetes API error (transport, conflict, admission, ...)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Request could not be issued or was rejected before reaching the API
    #[error("Control plane API error: {0}")]
    Api(String),
}

/// A server-side apply that did not go through.
#[derive(Debug, Error)]
#[error("error applying {target}: {cause}")]
pub struct ApplyError {
    /// `<Kind> <namespace>/<name>` of the object being applied
    pub target: String,
    #[source]
    pub cause: MetalApiError,
}

/// Errors raised while building or reloading the client provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Kubeconfig file could not be read
    #[error("failed to read metal kubeconfig {}: {source}", .path.display())]
    CredentialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Kubeconfig file is not a valid kubeconfig document
    #[error("unable to parse metal cluster kubeconfig: {0}")]
    CredentialParse(String),

    /// No usable namespace in the current kubeconfig context
    #[error("failed to get namespace from metal cluster kubeconfig: {0}")]
    NamespaceResolution(String),

    /// Client could not be built from the kubeconfig
    #[error("failed to create metal client: {0}")]
    ClientConstruction(String),

    /// Kubeconfig directory could not be watched, or the watch broke
    #[error("kubeconfig watch failed: {0}")]
    Watch(String),
}
