//! Ignition rendering
//!
//! Builds the first-boot Ignition (spec 3.4.0) document handed to a freshly
//! claimed server. The document always carries:
//!
//! - `/etc/hostname`
//! - `/var/lib/metal-cloud-config/metadata` (the composed machine metadata as JSON)
//! - `/etc/systemd/resolved.conf.d/dns.conf` when DNS servers are configured
//!
//! User data that is itself an Ignition document is merged into the result,
//! anything else is written verbatim to `/var/lib/metal-cloud-config/user-data`.
//! An extra Ignition fragment from the machine class is merged last.

pub mod error;
pub mod merge;

pub use error::IgnitionError;
pub use merge::{deep_merge, merge_config};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};
use std::net::IpAddr;
use tracing::debug;

/// Ignition spec version emitted by [`render`]
pub const IGNITION_VERSION: &str = "3.4.0";

const HOSTNAME_PATH: &str = "/etc/hostname";
const METADATA_PATH: &str = "/var/lib/metal-cloud-config/metadata";
const USER_DATA_PATH: &str = "/var/lib/metal-cloud-config/user-data";
const DNS_CONF_PATH: &str = "/etc/systemd/resolved.conf.d/dns.conf";

/// Everything needed to render one machine's Ignition document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub hostname: String,
    /// Raw user payload from the machine secret, passed through byte for byte
    pub user_data: Vec<u8>,
    /// Composed machine metadata
    pub metadata: Map<String, Value>,
    /// Extra Ignition fragment (JSON or YAML) from the machine class
    pub ignition: Option<String>,
    pub dns_servers: Vec<String>,
    /// Let the extra fragment win scalar conflicts with the generated document
    pub ignition_override: bool,
}

/// Renders the Ignition document as a JSON string.
pub fn render(config: &Config) -> Result<String, IgnitionError> {
    let mut files = vec![
        file_entry(HOSTNAME_PATH, config.hostname.as_bytes(), 0o644),
        file_entry(
            METADATA_PATH,
            &serde_json::to_vec(&config.metadata)?,
            0o644,
        ),
    ];

    if !config.dns_servers.is_empty() {
        files.push(file_entry(DNS_CONF_PATH, dns_conf(&config.dns_servers)?.as_bytes(), 0o644));
    }

    // Only text can be an Ignition document; anything else (e.g. gzip) is opaque.
    let user_ignition = match std::str::from_utf8(&config.user_data) {
        Ok(text) => parse_user_data(text)?,
        Err(_) => None,
    };
    if user_ignition.is_none() && !config.user_data.is_empty() {
        files.push(file_entry(USER_DATA_PATH, &config.user_data, 0o600));
    }

    let mut document = json!({
        "ignition": { "version": IGNITION_VERSION },
        "storage": { "files": files },
    });

    if let Some(user_ignition) = user_ignition {
        debug!("Merging Ignition document from user data");
        merge_config(&mut document, user_ignition, false);
    }

    if let Some(fragment) = config.ignition.as_deref().filter(|f| !f.trim().is_empty()) {
        let fragment: Value = serde_yaml::from_str(fragment)
            .map_err(|e| IgnitionError::InvalidFragment(e.to_string()))?;
        if !fragment.is_object() {
            return Err(IgnitionError::InvalidFragment(
                "ignition fragment must be a mapping".to_string(),
            ));
        }
        debug!(fragment_wins = config.ignition_override, "Merging Ignition fragment");
        merge_config(&mut document, fragment, config.ignition_override);
    }

    Ok(serde_json::to_string(&document)?)
}

/// Returns the user data as an Ignition document if it is one.
///
/// A mapping with an `ignition` key is treated as Ignition; such a mapping
/// without an `ignition.version` is rejected. Anything else is plain user data.
fn parse_user_data(user_data: &str) -> Result<Option<Value>, IgnitionError> {
    let Ok(value) = serde_yaml::from_str::<Value>(user_data) else {
        return Ok(None);
    };
    let Some(ignition) = value.get("ignition") else {
        return Ok(None);
    };
    if ignition.get("version").and_then(Value::as_str).is_none() {
        return Err(IgnitionError::InvalidUserData(
            "ignition.version is missing".to_string(),
        ));
    }
    Ok(Some(value))
}

fn dns_conf(servers: &[String]) -> Result<String, IgnitionError> {
    let mut parsed = Vec::with_capacity(servers.len());
    for server in servers {
        let ip: IpAddr = server
            .parse()
            .map_err(|_| IgnitionError::InvalidDnsServer(server.clone()))?;
        parsed.push(ip.to_string());
    }
    Ok(format!("[Resolve]\nDNS={}\n", parsed.join(" ")))
}

fn file_entry(path: &str, contents: &[u8], mode: u32) -> Value {
    json!({
        "path": path,
        "mode": mode,
        "overwrite": true,
        "contents": {
            "source": format!("data:;base64,{}", STANDARD.encode(contents)),
        },
    })
}
