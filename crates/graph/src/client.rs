//! Collaborator seams: cluster reads/writes and event recording.

use std::collections::BTreeMap;

use async_trait::async_trait;
use orka_core::{Kind, Object, ObjectKey};
use tracing::{info, warn};

use crate::dag::ObjectVertex;
use crate::error::ClientError;

/// Per-call options derived from the vertex being dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub field_manager: String,
    /// Delete without cascading to dependents.
    pub orphan: bool,
}

impl WriteOptions {
    pub fn for_vertex(vertex: &ObjectVertex, field_manager: &str) -> Self {
        Self { field_manager: field_manager.to_string(), orphan: vertex.orphan }
    }
}

/// Read-only view of the cluster, handed to transformers.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Object, ClientError>;

    /// Objects of `kind` in `namespace` carrying every label in `labels`.
    async fn list(&self, kind: Kind, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Object>, ClientError>;
}

/// Full client used when executing a plan.
#[async_trait]
pub trait ClusterClient: ClusterReader {
    async fn create(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError>;
    async fn update(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError>;
    /// Merge-patch the live object with the difference `base -> target`.
    async fn patch(&self, base: &Object, target: &Object, opts: &WriteOptions) -> Result<(), ClientError>;
    async fn delete(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError>;
    async fn update_status(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Fire-and-forget event sink. Implementations must not fail the caller.
pub trait EventRecorder: Send + Sync {
    fn record(&self, regarding: &ObjectKey, type_: EventType, reason: &str, message: &str);
}

/// Recorder that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, regarding: &ObjectKey, type_: EventType, reason: &str, message: &str) {
        match type_ {
            EventType::Normal => info!(object = %regarding, reason, message, "event"),
            EventType::Warning => warn!(object = %regarding, reason, message, "event"),
        }
    }
}
