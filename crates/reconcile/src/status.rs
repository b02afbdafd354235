//! Workload status derived from the replica units currently in the tree.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use orka_core::{Kind, ObjectTree, REVISION_LABEL};

use crate::error::ReconcileError;
use crate::reconciler::{CheckResult, Reconciler};

fn is_ready(p: &Pod) -> bool {
    p.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|cs| cs.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
}

fn count(n: usize) -> i32 { i32::try_from(n).unwrap_or(i32::MAX) }

/// Derives the workload status from the units in the tree.
#[derive(Debug, Default)]
pub struct StatusReconciler;

impl Reconciler for StatusReconciler {
    fn name(&self) -> &'static str { "status" }

    fn pre_condition(&self, tree: &ObjectTree) -> CheckResult {
        if tree.root_workload().is_some() { CheckResult::Satisfied } else { CheckResult::Unsatisfied("no workload root") }
    }

    fn reconcile(&self, tree: &ObjectTree) -> Result<ObjectTree, ReconcileError> {
        let mut out = tree.deep_copy();
        let pods: Vec<&Pod> = tree.list(Kind::Pod).filter_map(|o| o.as_pod()).collect();
        let current: BTreeMap<String, String> = pods
            .iter()
            .filter_map(|p| {
                let rev = p.metadata.labels.as_ref()?.get(REVISION_LABEL)?;
                Some((p.metadata.name.clone()?, rev.clone()))
            })
            .collect();

        let w = out.root_workload_mut().ok_or(ReconcileError::MissingRoot)?;
        let generation = w.metadata.generation.unwrap_or(0);
        let status = w.status.get_or_insert_with(Default::default);
        status.observed_generation = generation;
        status.replicas = count(pods.len());
        status.ready_replicas = count(pods.iter().filter(|p| is_ready(p)).count());
        let updated = current.iter().filter(|(name, rev)| status.update_revisions.get(*name) == Some(*rev)).count();
        status.updated_replicas = count(updated);
        status.current_revisions = current;
        Ok(out)
    }
}
