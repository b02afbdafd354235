//! Template revisions: a stable hash of the pod template each unit should run.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use orka_core::ObjectTree;
use sha2::{Digest, Sha256};

use crate::error::ReconcileError;
use crate::instances;
use crate::pod::effective_template;
use crate::reconciler::{CheckResult, Reconciler};

pub trait RevisionHasher: Send + Sync {
    fn revision(&self, template: &PodTemplateSpec) -> Result<String, ReconcileError>;
}

/// SHA-256 over the template's JSON encoding. The first
/// [`REVISION_BYTES`] digest bytes are hex-encoded so the value fits a label.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

pub const REVISION_BYTES: usize = 8;

impl RevisionHasher for Sha256Hasher {
    fn revision(&self, template: &PodTemplateSpec) -> Result<String, ReconcileError> {
        // Struct fields serialize in declaration order and maps are BTreeMaps,
        // so the encoding is canonical.
        let bytes = serde_json::to_vec(template).map_err(ReconcileError::Revision)?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        Ok(hex::encode(&digest[..REVISION_BYTES]))
    }
}

/// Records the desired revision of every wanted unit in `status.updateRevisions`.
pub struct RevisionUpdateReconciler {
    hasher: Box<dyn RevisionHasher>,
}

impl Default for RevisionUpdateReconciler {
    fn default() -> Self { Self::new(Sha256Hasher) }
}

impl RevisionUpdateReconciler {
    pub fn new(hasher: impl RevisionHasher + 'static) -> Self { Self { hasher: Box::new(hasher) } }
}

impl Reconciler for RevisionUpdateReconciler {
    fn name(&self) -> &'static str { "revision-update" }

    fn pre_condition(&self, tree: &ObjectTree) -> CheckResult {
        match tree.root_workload() {
            None => CheckResult::Unsatisfied("no workload root"),
            Some(_) if tree.root().is_some_and(|r| r.is_deleting()) => CheckResult::Unsatisfied("workload is being deleted"),
            Some(_) => CheckResult::Satisfied,
        }
    }

    fn reconcile(&self, tree: &ObjectTree) -> Result<ObjectTree, ReconcileError> {
        let mut out = tree.deep_copy();
        let w = out.root_workload_mut().ok_or(ReconcileError::MissingRoot)?;
        let mut revisions = BTreeMap::new();
        for d in instances::resolve(w)? {
            let rev = self.hasher.revision(&effective_template(w, d.template.as_ref()))?;
            revisions.insert(d.name, rev);
        }
        w.status.get_or_insert_with(Default::default).update_revisions = revisions;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use orka_core::{InstanceTemplate, ReplicatedStateMachine};

    fn with_container() -> ReplicatedStateMachine {
        ReplicatedStateMachine::new("ns", "web").with_template(PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![Container { name: "main".into(), image: Some("web:1".into()), ..Default::default() }],
                ..Default::default()
            }),
        })
    }

    #[test]
    fn hash_is_stable_and_fits_a_label() {
        let w = with_container();
        let h = Sha256Hasher;
        let base = h.revision(&effective_template(&w, None)).unwrap();
        assert_eq!(base, h.revision(&effective_template(&w.clone(), None)).unwrap());
        assert_eq!(base.len(), REVISION_BYTES * 2);
        assert!(base.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn hash_changes_with_instance_overrides() {
        let w = with_container();
        let h = Sha256Hasher;
        let base = h.revision(&effective_template(&w, None)).unwrap();

        let mut labelled = InstanceTemplate::generated("big", 1);
        labelled.labels.insert("tier".into(), "big".into());
        let by_label = h.revision(&effective_template(&w, Some(&labelled))).unwrap();
        assert_ne!(base, by_label);

        let mut imaged = labelled.clone();
        imaged.image = Some("web:2".into());
        let by_image = h.revision(&effective_template(&w, Some(&imaged))).unwrap();
        assert_ne!(by_label, by_image);
    }

    #[test]
    fn records_revision_per_desired_unit() {
        let mut tree = ObjectTree::new();
        let w = ReplicatedStateMachine::new("ns", "web").with_replicas(2).with_instance(InstanceTemplate::named("solo"));
        tree.set_root(w).unwrap();
        let r = RevisionUpdateReconciler::default();
        assert!(r.pre_condition(&tree).is_satisfied());
        let out = r.reconcile(&tree).unwrap();
        let revs = out.root_workload().unwrap().status_or_default().update_revisions;
        assert_eq!(revs.keys().collect::<Vec<_>>(), vec!["solo", "web-0"]);
        assert_ne!(revs["solo"], revs["web-0"]);
        assert!(tree.root_workload().unwrap().status.is_none());
    }

    struct Fixed;

    impl RevisionHasher for Fixed {
        fn revision(&self, _: &PodTemplateSpec) -> Result<String, ReconcileError> { Ok("r1".into()) }
    }

    #[test]
    fn custom_hasher_is_used() {
        let mut tree = ObjectTree::new();
        tree.set_root(ReplicatedStateMachine::new("ns", "web")).unwrap();
        let out = RevisionUpdateReconciler::new(Fixed).reconcile(&tree).unwrap();
        assert_eq!(out.root_workload().unwrap().status_or_default().update_revisions["web-0"], "r1");
    }
}
