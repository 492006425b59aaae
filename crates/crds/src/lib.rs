//! Metal provider CRD definitions
//!
//! Typed views of the control-plane objects the provider reads and writes:
//! cluster-api IPAM claims and addresses, and metal-operator server claims.
//! The schemas are owned by those projects; these types only cover the
//! fields the provider touches.

pub mod references;
pub mod ip_address_claim;
pub mod ip_address;
pub mod server_claim;

pub use references::*;
pub use ip_address_claim::*;
pub use ip_address::*;
pub use server_claim::*;
