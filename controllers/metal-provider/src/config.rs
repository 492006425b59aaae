//! Process configuration, read from the environment.

use crate::error::DriverError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 30_000;

/// How often and for how long to wait for an IP address claim to be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Kubeconfig of the metal cluster (`METAL_KUBECONFIG`)
    pub kubeconfig_path: PathBuf,
    pub poll: PollConfig,
    /// File holding the create request (`CREATE_MACHINE_REQUEST`); stdin when unset
    pub request_path: Option<PathBuf>,
}

impl DriverConfig {
    pub fn from_env() -> Result<Self, DriverError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DriverError> {
        let kubeconfig_path = lookup("METAL_KUBECONFIG")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                DriverError::Configuration("METAL_KUBECONFIG environment variable is required".to_string())
            })?;

        let poll = PollConfig {
            interval: millis(&lookup, "IP_CLAIM_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            timeout: millis(&lookup, "IP_CLAIM_POLL_TIMEOUT_MS", DEFAULT_POLL_TIMEOUT_MS)?,
        };

        Ok(Self {
            kubeconfig_path,
            poll,
            request_path: lookup("CREATE_MACHINE_REQUEST")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration, DriverError> {
    let Some(raw) = lookup(key) else {
        return Ok(Duration::from_millis(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(DriverError::Configuration(format!("{key} must be greater than zero"))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(DriverError::Configuration(format!("{key}={raw} is not a number of milliseconds: {e}"))),
    }
}
