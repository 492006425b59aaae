//! Provider error types.
//!
//! [`DriverError`] is the single terminal error a `create_machine` call
//! returns. [`Code`] is the caller-facing classification of it.

use ignition::IgnitionError;
use metal_client::{ApplyError, MetalApiError, ProviderError};
use std::time::Duration;
use thiserror::Error;

/// Caller-facing status code of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    InvalidArgument,
    Internal,
    Unavailable,
    DeadlineExceeded,
    Canceled,
}

/// Failures while obtaining an address for one network reference.
///
/// Every variant names the claim it was working on.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("failed to get IP address claim {claim}: {source}")]
    Lookup {
        claim: String,
        #[source]
        source: MetalApiError,
    },

    #[error("ipamRef of an ipamConfig is not set, cannot create IP address claim {claim}")]
    MissingPoolSelector { claim: String },

    #[error("error creating IP address claim {claim}: {source}")]
    Create {
        claim: String,
        #[source]
        source: ApplyError,
    },

    #[error("IP address claim {claim} was not bound within {timeout:?}")]
    Timeout { claim: String, timeout: Duration },

    #[error("failed to poll IP address claim {claim}: {source}")]
    Poll {
        claim: String,
        #[source]
        source: MetalApiError,
    },

    #[error(
        "failed to resolve IP address {address} bound to claim {claim}: {}",
        .source.as_ref().map_or_else(|| "not found".to_string(), ToString::to_string)
    )]
    AddressResolution {
        claim: String,
        address: String,
        #[source]
        source: Option<MetalApiError>,
    },

    #[error("allocation for IP address claim {claim} was cancelled")]
    Cancelled { claim: String },
}

impl AllocationError {
    /// Name of the claim the failure relates to
    pub fn claim(&self) -> &str {
        match self {
            Self::Lookup { claim, .. }
            | Self::MissingPoolSelector { claim }
            | Self::Create { claim, .. }
            | Self::Timeout { claim, .. }
            | Self::Poll { claim, .. }
            | Self::AddressResolution { claim, .. }
            | Self::Cancelled { claim } => claim,
        }
    }

    pub fn code(&self) -> Code {
        match self {
            Self::Lookup { .. } | Self::Create { .. } | Self::Poll { .. } | Self::AddressResolution { .. } => {
                Code::Unavailable
            }
            Self::MissingPoolSelector { .. } => Code::Internal,
            Self::Timeout { .. } => Code::DeadlineExceeded,
            Self::Cancelled { .. } => Code::Canceled,
        }
    }
}

/// Errors returned by the machine provider.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Malformed or incomplete request, or a request for another provider
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Bad provider spec, machine secret, credentials or process settings
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Machine secret has no `userData`
    #[error("failed to find user-data in machine secret {secret}")]
    MissingPayload { secret: String },

    #[error("failed to create ignition file for machine {machine}: {source}")]
    Render {
        machine: String,
        #[source]
        source: IgnitionError,
    },

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("request cancelled: {0}")]
    Cancelled(String),
}

impl DriverError {
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::Configuration(_) | Self::MissingPayload { .. } | Self::Render { .. } | Self::Apply(_) => {
                Code::Internal
            }
            Self::Allocation(e) => e.code(),
            Self::Cancelled(_) => Code::Canceled,
        }
    }
}

impl From<ProviderError> for DriverError {
    fn from(e: ProviderError) -> Self {
        Self::Configuration(e.to_string())
    }
}
