//! Orka reconcilers: replica alignment over an object tree and the
//! controller pass that turns the result into a plan.

#![forbid(unsafe_code)]

pub mod alignment;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod instances;
pub mod pod;
pub mod reconciler;
pub mod revision;
pub mod status;
pub mod transformers;

pub use alignment::ReplicasAlignmentReconciler;
pub use controller::{default_chain, Controller, PassSummary};
pub use error::ReconcileError;
pub use fetch::Fetcher;
pub use instances::{resolve, DesiredInstance};
pub use reconciler::{CheckResult, Reconciler, ReconcilerChain};
pub use revision::{Sha256Hasher, RevisionHasher, RevisionUpdateReconciler};
pub use status::StatusReconciler;
pub use transformers::{ChildrenDiffTransformer, RootDependencyTransformer, RootDiffTransformer};
