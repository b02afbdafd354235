//! Reconciler seam and the chain that threads a tree through reconcilers.

use orka_core::ObjectTree;
use tracing::debug;

use crate::error::ReconcileError;

/// Outcome of a reconciler's applicability check.
#[derive(Debug)]
pub enum CheckResult {
    Satisfied,
    /// Skip this reconciler; not an error.
    Unsatisfied(&'static str),
    /// The check itself failed; stops the chain.
    Failed(ReconcileError),
}

impl CheckResult {
    pub fn is_satisfied(&self) -> bool { matches!(self, CheckResult::Satisfied) }
}

/// A pure step over an object tree. `reconcile` returns a new tree and never
/// touches its input.
pub trait Reconciler: Send + Sync {
    fn name(&self) -> &'static str;

    fn pre_condition(&self, tree: &ObjectTree) -> CheckResult;

    fn reconcile(&self, tree: &ObjectTree) -> Result<ObjectTree, ReconcileError>;
}

/// Reconcilers run in order; the first error stops the chain.
#[derive(Default)]
pub struct ReconcilerChain {
    reconcilers: Vec<Box<dyn Reconciler>>,
}

impl ReconcilerChain {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, r: impl Reconciler + 'static) -> Self {
        self.reconcilers.push(Box::new(r));
        self
    }

    pub fn len(&self) -> usize { self.reconcilers.len() }

    pub fn is_empty(&self) -> bool { self.reconcilers.is_empty() }

    pub fn names(&self) -> Vec<&'static str> { self.reconcilers.iter().map(|r| r.name()).collect() }

    pub fn run(&self, tree: &ObjectTree) -> Result<ObjectTree, ReconcileError> {
        let mut current = tree.deep_copy();
        for r in &self.reconcilers {
            match r.pre_condition(&current) {
                CheckResult::Satisfied => {
                    current = r.reconcile(&current)?;
                    debug!(reconciler = r.name(), children = current.children_len(), "reconciled");
                }
                CheckResult::Unsatisfied(reason) => debug!(reconciler = r.name(), reason, "skipped"),
                CheckResult::Failed(e) => return Err(e),
            }
        }
        Ok(current)
    }
}
