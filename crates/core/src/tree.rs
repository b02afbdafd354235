//! In-memory object tree: one root workload plus its replica units.
//!
//! Trees are plain values. `Clone` is a deep copy, so reconcilers can try an
//! outcome on a copy while the source stays valid for comparison.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::object::{Kind, Object, ObjectKey};
use crate::workload::ReplicatedStateMachine;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree already has a root ({existing}); refusing to add {offered}")]
    RootConflict { existing: ObjectKey, offered: ObjectKey },
    #[error("{0} cannot be a tree root")]
    NotRootKind(Kind),
}

/// Root object plus children keyed by `(kind, namespace, name)`, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectTree {
    root: Option<Object>,
    children: FxHashMap<ObjectKey, Object>,
    order: Vec<ObjectKey>,
}

impl ObjectTree {
    pub fn new() -> Self { Self::default() }

    /// Set or replace the root.
    pub fn set_root(&mut self, root: impl Into<Object>) -> Result<(), TreeError> {
        let root = root.into();
        if !root.kind().is_root() {
            return Err(TreeError::NotRootKind(root.kind()));
        }
        self.root = Some(root);
        Ok(())
    }

    pub fn root(&self) -> Option<&Object> { self.root.as_ref() }

    pub fn root_mut(&mut self) -> Option<&mut Object> { self.root.as_mut() }

    pub fn root_workload(&self) -> Option<&ReplicatedStateMachine> {
        self.root.as_ref().and_then(Object::as_workload)
    }

    pub fn root_workload_mut(&mut self) -> Option<&mut ReplicatedStateMachine> {
        self.root.as_mut().and_then(Object::as_workload_mut)
    }

    /// Insert or overwrite children. A root-kind object is accepted only while
    /// the tree has no root; use [`ObjectTree::set_root`] to replace it.
    pub fn add<I, O>(&mut self, objects: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = O>,
        O: Into<Object>,
    {
        for obj in objects {
            let obj = obj.into();
            if obj.kind().is_root() {
                if let Some(existing) = &self.root {
                    return Err(TreeError::RootConflict { existing: existing.key(), offered: obj.key() });
                }
                self.root = Some(obj);
                continue;
            }
            let key = obj.key();
            if self.children.insert(key.clone(), obj).is_none() {
                self.order.push(key);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&Object> {
        if let Some(root) = &self.root {
            if root.kind() == key.kind && root.key() == *key {
                return Some(root);
            }
        }
        self.children.get(key)
    }

    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut Object> {
        self.children.get_mut(key)
    }

    /// Remove a child. The root is never removed through this call.
    pub fn delete(&mut self, key: &ObjectKey) -> Option<Object> {
        let removed = self.children.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool { self.children.contains_key(key) }

    /// Children of `kind`, in insertion order.
    pub fn list(&self, kind: Kind) -> impl Iterator<Item = &Object> + '_ {
        self.children().filter(move |o| o.kind() == kind)
    }

    /// All children, in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &Object> + '_ {
        self.order.iter().filter_map(|k| self.children.get(k))
    }

    pub fn children_len(&self) -> usize { self.children.len() }

    /// A structurally independent copy of this tree.
    pub fn deep_copy(&self) -> ObjectTree { self.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta { name: Some(name.into()), namespace: Some("default".into()), ..Default::default() },
            ..Default::default()
        }
    }

    fn tree() -> ObjectTree {
        let mut t = ObjectTree::new();
        t.set_root(ReplicatedStateMachine::new("default", "bar")).unwrap();
        t.add([pod("bar-1"), pod("bar-0")]).unwrap();
        t
    }

    #[test]
    fn list_keeps_insertion_order() {
        let t = tree();
        let names: Vec<_> = t.list(Kind::Pod).map(|o| o.name().to_string()).collect();
        assert_eq!(names, vec!["bar-1", "bar-0"]);
    }

    #[test]
    fn add_overwrites_by_key_without_duplicating() {
        let mut t = tree();
        let mut p = pod("bar-1");
        p.metadata.labels = Some([("a".to_string(), "b".to_string())].into());
        t.add([p]).unwrap();
        assert_eq!(t.children_len(), 2);
        let key = ObjectKey::new(Kind::Pod, "default", "bar-1");
        assert!(t.get(&key).unwrap().meta().labels.is_some());
        let names: Vec<_> = t.list(Kind::Pod).map(|o| o.name().to_string()).collect();
        assert_eq!(names, vec!["bar-1", "bar-0"]);
    }

    #[test]
    fn second_root_is_rejected() {
        let mut t = tree();
        let err = t.add([ReplicatedStateMachine::new("default", "other")]).unwrap_err();
        assert!(matches!(err, TreeError::RootConflict { .. }));
        assert_eq!(t.root().unwrap().name(), "bar");
        t.set_root(ReplicatedStateMachine::new("default", "other")).unwrap();
        assert_eq!(t.root().unwrap().name(), "other");
    }

    #[test]
    fn pods_cannot_be_roots() {
        let mut t = ObjectTree::new();
        assert_eq!(t.set_root(pod("x")).unwrap_err(), TreeError::NotRootKind(Kind::Pod));
    }

    #[test]
    fn deep_copy_is_independent() {
        let t = tree();
        let mut c = t.deep_copy();
        assert_eq!(t, c);
        c.root_workload_mut().unwrap().spec.replicas = 9;
        c.delete(&ObjectKey::new(Kind::Pod, "default", "bar-0"));
        c.add([pod("bar-7")]).unwrap();
        assert_eq!(t.root_workload().unwrap().spec.replicas, 1);
        assert_eq!(t.children_len(), 2);
        assert!(t.contains(&ObjectKey::new(Kind::Pod, "default", "bar-0")));
        assert_ne!(t, c);
    }

    #[test]
    fn delete_removes_from_order() {
        let mut t = tree();
        assert!(t.delete(&ObjectKey::new(Kind::Pod, "default", "bar-1")).is_some());
        assert!(t.delete(&ObjectKey::new(Kind::Pod, "default", "bar-1")).is_none());
        let names: Vec<_> = t.children().map(|o| o.name().to_string()).collect();
        assert_eq!(names, vec!["bar-0"]);
    }
}
