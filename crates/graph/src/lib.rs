//! Orka mutation graph: intent vertices, transformer chains and plan execution.
//!
//! A reconciliation pass builds a [`Dag`] by running a [`TransformerChain`]
//! over a [`TransformContext`], freezes it into a [`Plan`] and walks the plan
//! against a [`ClusterClient`].

#![forbid(unsafe_code)]

pub mod client;
pub mod dag;
pub mod error;
pub mod merge_patch;
pub mod plan;
pub mod transformer;

pub use client::{ClusterClient, ClusterReader, EventRecorder, EventType, TracingRecorder, WriteOptions};
pub use dag::{Action, Dag, ObjectVertex, VertexId};
pub use error::{ClientError, GraphError, PlanError};
pub use plan::{Plan, PlanBuilder, PlanStats};
pub use transformer::{TransformContext, Transformer, TransformerChain};
