//! Replica alignment: move the tree's replica units toward the desired set.
//!
//! `Parallel` emits every create and delete in one pass. `OrderedReady`
//! makes a single move per pass: the lowest missing unit (by group, then
//! ordinal) is created; only when nothing is missing is the highest surplus
//! unit deleted. Units that are both present and desired are never touched.

use std::collections::BTreeSet;

use orka_core::{ControllerConfig, Kind, ObjectKey, ObjectTree, PodManagementPolicy};
use tracing::debug;

use crate::error::ReconcileError;
use crate::instances::{self, compare_names, DesiredInstance};
use crate::pod::build_pod;
use crate::reconciler::{CheckResult, Reconciler};

pub struct ReplicasAlignmentReconciler {
    config: ControllerConfig,
}

impl ReplicasAlignmentReconciler {
    pub fn new(config: ControllerConfig) -> Self { Self { config } }
}

impl Default for ReplicasAlignmentReconciler {
    fn default() -> Self { Self::new(ControllerConfig::default()) }
}

impl Reconciler for ReplicasAlignmentReconciler {
    fn name(&self) -> &'static str { "replicas-alignment" }

    fn pre_condition(&self, tree: &ObjectTree) -> CheckResult {
        if tree.root_workload().is_some() { CheckResult::Satisfied } else { CheckResult::Unsatisfied("no workload root") }
    }

    fn reconcile(&self, tree: &ObjectTree) -> Result<ObjectTree, ReconcileError> {
        let mut out = tree.deep_copy();
        let w = tree.root_workload().ok_or(ReconcileError::MissingRoot)?;
        let ns = w.namespace();
        let current: BTreeSet<String> = tree.list(Kind::Pod).map(|o| o.name().to_string()).collect();

        if tree.root().is_some_and(|r| r.is_deleting()) {
            for name in &current {
                out.delete(&ObjectKey::new(Kind::Pod, ns, name.as_str()));
            }
            debug!(deleted = current.len(), "workload deleting, removing all units");
            return Ok(out);
        }

        let desired = instances::resolve(w)?;
        let wanted: BTreeSet<&str> = desired.iter().map(|d| d.name.as_str()).collect();
        let to_create: Vec<&DesiredInstance> = desired.iter().filter(|d| !current.contains(&d.name)).collect();
        let mut to_delete: Vec<&str> = current.iter().map(String::as_str).filter(|n| !wanted.contains(n)).collect();
        to_delete.sort_by(|a, b| compare_names(a, b));

        let (create, delete): (Vec<&DesiredInstance>, Vec<&str>) = match w.spec.pod_management_policy {
            PodManagementPolicy::Parallel => (to_create, to_delete),
            PodManagementPolicy::OrderedReady => match to_create.first() {
                Some(first) => (vec![*first], vec![]),
                None => (vec![], to_delete.last().copied().into_iter().collect()),
            },
        };

        let revisions = w.status.as_ref().map(|s| &s.update_revisions);
        for d in &create {
            let rev = revisions.and_then(|r| r.get(&d.name)).map(String::as_str);
            out.add([build_pod(w, d, rev, &self.config)])?;
        }
        for name in &delete {
            out.delete(&ObjectKey::new(Kind::Pod, ns, *name));
        }
        debug!(
            policy = ?w.spec.pod_management_policy,
            create = ?create.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            delete = ?delete,
            "aligned replicas"
        );
        Ok(out)
    }
}
