//! Error types for graph construction, dispatch and the cluster client seam.

use orka_core::ObjectKey;
use thiserror::Error;

use crate::dag::Action;

/// Errors returned by cluster client collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(ObjectKey),
    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),
    #[error("conflict on {key}: {message}")]
    Conflict { key: ObjectKey, message: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool { matches!(self, ClientError::NotFound(_)) }
    pub fn is_already_exists(&self) -> bool { matches!(self, ClientError::AlreadyExists(_)) }
}

/// Structural errors in the mutation graph. These are construction bugs and never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate intent for {0}")]
    DuplicateVertex(ObjectKey),
    #[error("no vertex for {0}")]
    UnknownVertex(ObjectKey),
    #[error("patch intent for {0} has no original object")]
    MissingPatchBase(ObjectKey),
    #[error("dependency cycle among {0:?}")]
    Cycle(Vec<ObjectKey>),
    #[error("parallel transformers disagree on {0}")]
    MergeConflict(ObjectKey),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{action} {key} failed: {source}")]
    Dispatch {
        action: Action,
        key: ObjectKey,
        #[source]
        source: ClientError,
    },
    #[error("transformer {name} failed: {source}")]
    Transformer {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("reconciliation cancelled")]
    Cancelled,
}
