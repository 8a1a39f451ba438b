//! Kubermatic CRD Definitions
//!
//! Kubernetes Custom Resource Definitions read and written by the seed
//! controllers: user clusters, etcd backup configurations, addons,
//! constraints and the cluster-api machine objects living inside a user cluster.

pub mod addon;
pub mod cluster;
pub mod constraint;
pub mod etcd_backup_config;
pub mod machine;

pub use addon::*;
pub use cluster::*;
pub use constraint::*;
pub use etcd_backup_config::*;
pub use machine::*;
