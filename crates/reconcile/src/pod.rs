//! Replica unit construction from the workload template.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use orka_core::{ControllerConfig, InstanceTemplate, ReplicatedStateMachine, REVISION_LABEL, TEMPLATE_LABEL};

use crate::instances::DesiredInstance;

/// The workload's pod template with `instance` overrides applied.
pub fn effective_template(w: &ReplicatedStateMachine, instance: Option<&InstanceTemplate>) -> PodTemplateSpec {
    let mut tpl = w.spec.template.clone();
    let Some(inst) = instance else { return tpl };
    let meta = tpl.metadata.get_or_insert_with(ObjectMeta::default);
    if !inst.labels.is_empty() {
        meta.labels.get_or_insert_with(BTreeMap::new).extend(inst.labels.clone());
    }
    if !inst.annotations.is_empty() {
        meta.annotations.get_or_insert_with(BTreeMap::new).extend(inst.annotations.clone());
    }
    meta.labels.get_or_insert_with(BTreeMap::new).insert(TEMPLATE_LABEL.to_string(), inst.id().to_string());
    if let Some(image) = &inst.image {
        if let Some(c) = tpl.spec.as_mut().and_then(|s| s.containers.first_mut()) {
            c.image = Some(image.clone());
        }
    }
    tpl
}

/// Build the replica unit for `desired`, owned by `w` and guarded by the
/// controller finalizer.
pub fn build_pod(w: &ReplicatedStateMachine, desired: &DesiredInstance, revision: Option<&str>, config: &ControllerConfig) -> Pod {
    let tpl = effective_template(w, desired.template.as_ref());
    let tmeta = tpl.metadata.unwrap_or_default();
    let mut labels = tmeta.labels.unwrap_or_default();
    labels.insert(config.instance_label.clone(), w.name().to_string());
    if let Some(rev) = revision {
        labels.insert(REVISION_LABEL.to_string(), rev.to_string());
    }
    let mut spec = tpl.spec.unwrap_or_default();
    spec.hostname = Some(desired.name.clone());
    spec.subdomain = w.spec.service_name.clone();
    Pod {
        metadata: ObjectMeta {
            name: Some(desired.name.clone()),
            namespace: Some(w.namespace().to_string()),
            labels: Some(labels),
            annotations: tmeta.annotations.filter(|a| !a.is_empty()),
            owner_references: Some(vec![w.owner_reference()]),
            finalizers: Some(vec![config.finalizer.clone()]),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn workload() -> ReplicatedStateMachine {
        let tpl = PodTemplateSpec {
            metadata: Some(ObjectMeta { labels: Some([("app".to_string(), "db".to_string())].into()), ..Default::default() }),
            spec: Some(PodSpec {
                containers: vec![Container { name: "main".into(), image: Some("db:1".into()), ..Default::default() }],
                ..Default::default()
            }),
        };
        let mut w = ReplicatedStateMachine::new("prod", "db").with_template(tpl);
        w.metadata.uid = Some("uid-db".into());
        w.spec.service_name = Some("db-headless".into());
        w
    }

    #[test]
    fn common_unit_carries_identity_and_ownership() {
        let w = workload();
        let cfg = ControllerConfig::default();
        let p = build_pod(&w, &DesiredInstance { name: "db-0".into(), template: None }, Some("abc"), &cfg);
        let labels = p.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("db"));
        assert_eq!(labels.get(&cfg.instance_label).map(String::as_str), Some("db"));
        assert_eq!(labels.get(REVISION_LABEL).map(String::as_str), Some("abc"));
        assert!(!labels.contains_key(TEMPLATE_LABEL));
        assert_eq!(p.metadata.namespace.as_deref(), Some("prod"));
        assert_eq!(p.metadata.owner_references.as_ref().unwrap()[0].uid, "uid-db");
        assert_eq!(p.metadata.finalizers, Some(vec![cfg.finalizer.clone()]));
        let spec = p.spec.as_ref().unwrap();
        assert_eq!(spec.hostname.as_deref(), Some("db-0"));
        assert_eq!(spec.subdomain.as_deref(), Some("db-headless"));
    }

    #[test]
    fn instance_overrides_apply() {
        let w = workload();
        let mut inst = InstanceTemplate::generated("db-big", 1);
        inst.labels.insert("tier".into(), "big".into());
        inst.annotations.insert("note".into(), "x".into());
        inst.image = Some("db:2".into());
        let p = build_pod(&w, &DesiredInstance { name: "db-big-0".into(), template: Some(inst) }, None, &ControllerConfig::default());
        let labels = p.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get("tier").map(String::as_str), Some("big"));
        assert_eq!(labels.get(TEMPLATE_LABEL).map(String::as_str), Some("db-big"));
        assert!(!labels.contains_key(REVISION_LABEL));
        assert_eq!(p.metadata.annotations.as_ref().unwrap().get("note").map(String::as_str), Some("x"));
        assert_eq!(p.spec.as_ref().unwrap().containers[0].image.as_deref(), Some("db:2"));
        // The workload template itself is untouched.
        assert_eq!(effective_template(&w, None), w.spec.template);
    }
}
