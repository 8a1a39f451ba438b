//! Prints the CustomResourceDefinitions owned by the seed controllers as a
//! multi-document YAML stream, ready for `kubectl apply -f -`.

use crds::{Addon, Cluster, Constraint, EtcdBackupConfig};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        Cluster::crd(),
        EtcdBackupConfig::crd(),
        Addon::crd(),
        Constraint::crd(),
    ];

    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
