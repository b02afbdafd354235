//! Orka core types: cluster objects, the in-memory object tree and the scheme registry.

#![forbid(unsafe_code)]

pub mod config;
pub mod object;
pub mod scheme;
pub mod tree;
pub mod workload;

pub use config::{ConfigError, ControllerConfig};
pub use object::{Kind, Object, ObjectKey};
pub use scheme::{Scheme, SchemeError, TypeInfo};
pub use tree::{ObjectTree, TreeError};
pub use workload::{
    InstanceTemplate, PodManagementPolicy, ReplicatedStateMachine, WorkloadSpec, WorkloadStatus,
};

pub mod prelude {
    pub use super::{
        ControllerConfig, InstanceTemplate, Kind, Object, ObjectKey, ObjectTree, PodManagementPolicy,
        ReplicatedStateMachine, Scheme,
    };
}

/// Label carrying the owning workload's name on every replica unit.
pub const INSTANCE_LABEL: &str = "workloads.orka.io/instance";
/// Label carrying the instance template a unit was generated from (absent for the common template).
pub const TEMPLATE_LABEL: &str = "workloads.orka.io/instance-template";
/// Label carrying the template revision a unit was built from.
pub const REVISION_LABEL: &str = "controller-revision-hash";
/// Finalizer guarding workloads and replica units until the controller releases them.
pub const FINALIZER: &str = "workloads.orka.io/finalizer";
