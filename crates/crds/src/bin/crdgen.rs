//! Prints the CRD manifests of the typed resources.
//!
//! Intended for test clusters that do not run the IPAM and metal operators.

use crds::{IPAddress, IPAddressClaim, ServerClaim};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [IPAddressClaim::crd(), IPAddress::crd(), ServerClaim::crd()] {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
