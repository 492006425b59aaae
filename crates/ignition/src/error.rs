//! Ignition rendering errors

use thiserror::Error;

/// Errors that can occur while rendering an Ignition document
#[derive(Debug, Error)]
pub enum IgnitionError {
    /// A configured DNS server is not an IP address
    #[error("Invalid DNS server address: {0}")]
    InvalidDnsServer(String),

    /// The extra Ignition fragment could not be parsed
    #[error("Invalid Ignition fragment: {0}")]
    InvalidFragment(String),

    /// User data looks like Ignition but is not a usable document
    #[error("Invalid Ignition user data: {0}")]
    InvalidUserData(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
