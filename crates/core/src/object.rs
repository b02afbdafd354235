//! Cluster objects handled by the controller, as a closed set of kinds.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::workload::ReplicatedStateMachine;

/// Object kinds known to the controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    ReplicatedStateMachine,
    Pod,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::ReplicatedStateMachine, Kind::Pod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ReplicatedStateMachine => "ReplicatedStateMachine",
            Kind::Pod => "Pod",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Kind::ReplicatedStateMachine => "workloads.orka.io/v1alpha1",
            Kind::Pod => "v1",
        }
    }

    /// Whether objects of this kind sit at the root of an object tree.
    pub fn is_root(&self) -> bool {
        matches!(self, Kind::ReplicatedStateMachine)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an object: `(kind, namespace, name)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind, namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// A cluster object of one of the known kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Workload(ReplicatedStateMachine),
    Pod(Pod),
}

impl From<ReplicatedStateMachine> for Object {
    fn from(v: ReplicatedStateMachine) -> Self { Object::Workload(v) }
}

impl From<Pod> for Object {
    fn from(v: Pod) -> Self { Object::Pod(v) }
}

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Object::Workload(_) => Kind::ReplicatedStateMachine,
            Object::Pod(_) => Kind::Pod,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Object::Workload(w) => &w.metadata,
            Object::Pod(p) => &p.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Object::Workload(w) => &mut w.metadata,
            Object::Pod(p) => &mut p.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or("")
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind(), self.namespace(), self.name())
    }

    pub fn as_workload(&self) -> Option<&ReplicatedStateMachine> {
        match self {
            Object::Workload(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_workload_mut(&mut self) -> Option<&mut ReplicatedStateMachine> {
        match self {
            Object::Workload(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            Object::Pod(p) => Some(p),
            _ => None,
        }
    }

    /// True once the API server has stamped a deletion timestamp.
    pub fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.meta().finalizers.as_ref().is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// Adds `finalizer` unless present. Returns whether the object changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.meta_mut().finalizers.get_or_insert_with(Vec::new).push(finalizer.to_string());
        true
    }

    /// Removes `finalizer` if present. Returns whether the object changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let Some(list) = self.meta_mut().finalizers.as_mut() else { return false };
        let before = list.len();
        list.retain(|f| f != finalizer);
        let changed = list.len() != before;
        if list.is_empty() {
            self.meta_mut().finalizers = None;
        }
        changed
    }

    /// Serialize with `apiVersion`/`kind` populated.
    pub fn to_json(&self) -> serde_json::Result<Json> {
        let mut v = match self {
            Object::Workload(w) => serde_json::to_value(w)?,
            Object::Pod(p) => serde_json::to_value(p)?,
        };
        if let Some(obj) = v.as_object_mut() {
            let kind = self.kind();
            obj.insert("apiVersion".into(), Json::String(kind.api_version().to_string()));
            obj.insert("kind".into(), Json::String(kind.as_str().to_string()));
        }
        Ok(v)
    }

    pub fn from_json(kind: Kind, v: Json) -> serde_json::Result<Object> {
        Ok(match kind {
            Kind::ReplicatedStateMachine => Object::Workload(serde_json::from_value(v)?),
            Kind::Pod => Object::Pod(serde_json::from_value(v)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str) -> Object {
        Object::Pod(Pod {
            metadata: ObjectMeta { name: Some(name.into()), namespace: Some("ns".into()), ..Default::default() },
            ..Default::default()
        })
    }

    #[test]
    fn key_display_includes_namespace_when_set() {
        let p = pod("web-0");
        assert_eq!(p.key().to_string(), "Pod/ns/web-0");
        let k = ObjectKey::new(Kind::ReplicatedStateMachine, "", "web");
        assert_eq!(k.to_string(), "ReplicatedStateMachine/web");
    }

    #[test]
    fn finalizers_add_and_remove_report_changes() {
        let mut p = pod("web-0");
        assert!(p.add_finalizer("a/b"));
        assert!(!p.add_finalizer("a/b"));
        assert!(p.has_finalizer("a/b"));
        assert!(p.remove_finalizer("a/b"));
        assert!(!p.remove_finalizer("a/b"));
        assert!(p.meta().finalizers.is_none());
    }

    #[test]
    fn json_carries_type_meta() {
        let v = pod("web-0").to_json().unwrap();
        assert_eq!(v["apiVersion"], "v1");
        assert_eq!(v["kind"], "Pod");
        assert_eq!(v["metadata"]["name"], "web-0");
        let back = Object::from_json(Kind::Pod, v).unwrap();
        assert_eq!(back.name(), "web-0");
    }
}
