use orka_core::TreeError;
use orka_graph::{ClientError, PlanError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("object tree has no workload root")]
    MissingRoot,
    #[error("replicas must not be negative (got {0})")]
    NegativeReplicas(i32),
    #[error("instance template {id:?}: {reason}")]
    InvalidTemplate { id: String, reason: &'static str },
    #[error("instance name {0} is claimed by more than one template")]
    NameCollision(String),
    #[error("replicas {total} is less than the {claimed} units named by instance templates")]
    InsufficientReplicas { total: i32, claimed: usize },
    #[error("revision hash: {0}")]
    Revision(#[source] serde_json::Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] ClientError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl ReconcileError {
    /// Configuration errors are fatal to the pass and are not worth retrying
    /// until the workload changes.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ReconcileError::NegativeReplicas(_)
                | ReconcileError::InvalidTemplate { .. }
                | ReconcileError::NameCollision(_)
                | ReconcileError::InsufficientReplicas { .. }
        )
    }
}
