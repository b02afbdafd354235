//! The `ReplicatedStateMachine` workload resource (`workloads.orka.io/v1alpha1`).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::{Deserialize, Serialize};

use crate::object::Kind;

/// How replica units are brought up and torn down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PodManagementPolicy {
    /// One unit at a time, in ordinal order.
    #[default]
    OrderedReady,
    /// All pending creates and deletes at once.
    Parallel,
}

/// Names one unit explicitly (`name`) or a group of `replicas` units (`generateName-<ordinal>`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Overrides the image of the first container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl InstanceTemplate {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }

    pub fn generated(prefix: impl Into<String>, replicas: i32) -> Self {
        Self { generate_name: Some(prefix.into()), replicas: Some(replicas), ..Default::default() }
    }

    /// Identifier used in labels and error messages.
    pub fn id(&self) -> &str {
        self.name.as_deref().or(self.generate_name.as_deref()).unwrap_or("")
    }
}

fn default_replicas() -> i32 { 1 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Total number of replica units, across all instance templates.
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    #[serde(default)]
    pub pod_management_policy: PodManagementPolicy,
    #[serde(default)]
    pub template: PodTemplateSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<InstanceTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            pod_management_policy: PodManagementPolicy::default(),
            template: PodTemplateSpec::default(),
            instances: Vec::new(),
            service_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub updated_replicas: i32,
    /// Desired template revision per unit name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub update_revisions: BTreeMap<String, String>,
    /// Revision each existing unit was built from.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub current_revisions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplicatedStateMachine {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkloadSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkloadStatus>,
}

impl ReplicatedStateMachine {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.spec.replicas = replicas;
        self
    }

    pub fn with_policy(mut self, policy: PodManagementPolicy) -> Self {
        self.spec.pod_management_policy = policy;
        self
    }

    pub fn with_template(mut self, template: PodTemplateSpec) -> Self {
        self.spec.template = template;
        self
    }

    pub fn with_instance(mut self, instance: InstanceTemplate) -> Self {
        self.spec.instances.push(instance);
        self
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("")
    }

    pub fn status_or_default(&self) -> WorkloadStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Controller owner reference pointing back at this workload.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: Kind::ReplicatedStateMachine.api_version().to_string(),
            kind: Kind::ReplicatedStateMachine.as_str().to_string(),
            name: self.name().to_string(),
            uid: self.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_apply_on_sparse_manifest() {
        let v = serde_json::json!({
            "metadata": { "name": "bar", "namespace": "default" },
            "spec": { "instances": [ { "generateName": "foo", "replicas": 2 } ] }
        });
        let w: ReplicatedStateMachine = serde_json::from_value(v).unwrap();
        assert_eq!(w.spec.replicas, 1);
        assert_eq!(w.spec.pod_management_policy, PodManagementPolicy::OrderedReady);
        assert_eq!(w.spec.instances[0].id(), "foo");
        assert!(w.status.is_none());
    }

    #[test]
    fn policy_parses_parallel() {
        let v = serde_json::json!({ "podManagementPolicy": "Parallel" });
        let s: WorkloadSpec = serde_json::from_value(v).unwrap();
        assert_eq!(s.pod_management_policy, PodManagementPolicy::Parallel);
    }

    #[test]
    fn owner_reference_marks_controller() {
        let mut w = ReplicatedStateMachine::new("default", "bar");
        w.metadata.uid = Some("u-1".into());
        let o = w.owner_reference();
        assert_eq!(o.kind, "ReplicatedStateMachine");
        assert_eq!(o.uid, "u-1");
        assert_eq!(o.controller, Some(true));
    }
}
