//! Arena-backed DAG of intent vertices.
//!
//! Vertices live in a slot vector addressed by [`VertexId`]; edges are id
//! pairs. `connect(from, to)` records that `from` is applied after `to`, and
//! [`Dag::walk_reverse_topo`] visits a vertex only once everything it points
//! to has been visited. Ties break by registration order.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use orka_core::{Object, ObjectKey};
use rustc_hash::FxHashMap;

use crate::error::GraphError;

/// What to do with a vertex's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Patch,
    Delete,
    StatusUpdate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Patch => "patch",
            Action::Delete => "delete",
            Action::StatusUpdate => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending write against one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVertex {
    pub obj: Object,
    /// Diff base for [`Action::Patch`].
    pub ori_obj: Option<Object>,
    pub action: Action,
    /// Delete without cascading to dependents.
    pub orphan: bool,
}

impl ObjectVertex {
    fn new(obj: Object, ori_obj: Option<Object>, action: Action) -> Self {
        Self { obj, ori_obj, action, orphan: false }
    }

    pub fn create(obj: impl Into<Object>) -> Self { Self::new(obj.into(), None, Action::Create) }
    pub fn update(obj: impl Into<Object>) -> Self { Self::new(obj.into(), None, Action::Update) }
    pub fn delete(obj: impl Into<Object>) -> Self { Self::new(obj.into(), None, Action::Delete) }
    pub fn status(obj: impl Into<Object>) -> Self { Self::new(obj.into(), None, Action::StatusUpdate) }

    pub fn patch(ori: impl Into<Object>, obj: impl Into<Object>) -> Self {
        Self::new(obj.into(), Some(ori.into()), Action::Patch)
    }

    pub fn orphaned(mut self) -> Self {
        self.orphan = true;
        self
    }

    pub fn key(&self) -> ObjectKey { self.obj.key() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(usize);

#[derive(Debug, Clone, Default)]
pub struct Dag {
    slots: Vec<Option<ObjectVertex>>,
    index: FxHashMap<ObjectKey, VertexId>,
    edges: BTreeSet<(VertexId, VertexId)>,
}

/// Key-addressed difference between a graph and the base it was cloned from.
#[derive(Debug, Clone, Default)]
pub(crate) struct DagDelta {
    pub upserts: Vec<ObjectVertex>,
    pub removals: Vec<ObjectKey>,
    pub edges_added: Vec<(ObjectKey, ObjectKey)>,
    pub edges_removed: Vec<(ObjectKey, ObjectKey)>,
}

impl Dag {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.index.len() }

    pub fn is_empty(&self) -> bool { self.index.is_empty() }

    /// Register an intent. A second intent for the same object is rejected.
    pub fn add_vertex(&mut self, vertex: ObjectVertex) -> Result<VertexId, GraphError> {
        let key = vertex.key();
        if self.index.contains_key(&key) {
            return Err(GraphError::DuplicateVertex(key));
        }
        if vertex.action == Action::Patch && vertex.ori_obj.is_none() {
            return Err(GraphError::MissingPatchBase(key));
        }
        let id = VertexId(self.slots.len());
        self.slots.push(Some(vertex));
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn remove_vertex(&mut self, key: &ObjectKey) -> Option<ObjectVertex> {
        let id = self.index.remove(key)?;
        self.edges.retain(|(a, b)| *a != id && *b != id);
        self.slots[id.0].take()
    }

    pub fn vertex(&self, key: &ObjectKey) -> Option<&ObjectVertex> {
        let id = self.index.get(key)?;
        self.slots[id.0].as_ref()
    }

    pub fn vertex_mut(&mut self, key: &ObjectKey) -> Option<&mut ObjectVertex> {
        let id = self.index.get(key)?;
        self.slots[id.0].as_mut()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool { self.index.contains_key(key) }

    /// Vertices in registration order.
    pub fn vertices(&self) -> impl Iterator<Item = &ObjectVertex> + '_ {
        self.slots.iter().filter_map(Option::as_ref)
    }

    fn id_of(&self, key: &ObjectKey) -> Result<VertexId, GraphError> {
        self.index.get(key).copied().ok_or_else(|| GraphError::UnknownVertex(key.clone()))
    }

    fn key_of(&self, id: VertexId) -> Option<ObjectKey> {
        self.slots.get(id.0).and_then(Option::as_ref).map(ObjectVertex::key)
    }

    /// `from` is applied after `to`.
    pub fn connect(&mut self, from: &ObjectKey, to: &ObjectKey) -> Result<(), GraphError> {
        let (a, b) = (self.id_of(from)?, self.id_of(to)?);
        if a == b {
            return Err(GraphError::Cycle(vec![from.clone()]));
        }
        self.edges.insert((a, b));
        Ok(())
    }

    pub fn disconnect(&mut self, from: &ObjectKey, to: &ObjectKey) -> Result<(), GraphError> {
        let (a, b) = (self.id_of(from)?, self.id_of(to)?);
        self.edges.remove(&(a, b));
        Ok(())
    }

    /// Edges as `(from, to)` key pairs.
    pub fn edges(&self) -> BTreeSet<(ObjectKey, ObjectKey)> {
        self.edges
            .iter()
            .filter_map(|(a, b)| Some((self.key_of(*a)?, self.key_of(*b)?)))
            .collect()
    }

    /// Vertex ids in application order. Fails on a cycle.
    pub fn topo_order(&self) -> Result<Vec<VertexId>, GraphError> {
        let mut pending: FxHashMap<VertexId, usize> = FxHashMap::default();
        let mut dependents: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
        for id in self.index.values() {
            pending.insert(*id, 0);
        }
        for (from, to) in &self.edges {
            *pending.entry(*from).or_default() += 1;
            dependents.entry(*to).or_default().push(*from);
        }
        let mut ready: BTreeSet<VertexId> = pending.iter().filter(|(_, n)| **n == 0).map(|(id, _)| *id).collect();
        let mut out = Vec::with_capacity(pending.len());
        while let Some(id) = ready.pop_first() {
            out.push(id);
            for dep in dependents.get(&id).into_iter().flatten() {
                if let Some(n) = pending.get_mut(dep) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(*dep);
                    }
                }
            }
        }
        if out.len() < pending.len() {
            let done: BTreeSet<VertexId> = out.into_iter().collect();
            let mut stuck: Vec<ObjectKey> = pending.keys().filter(|id| !done.contains(*id)).filter_map(|id| self.key_of(*id)).collect();
            stuck.sort();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.topo_order().map(|_| ())
    }

    /// Visit every vertex after the vertices it depends on, collecting the
    /// visitor's outputs in visit order. The first error from `visit` stops
    /// the walk; vertices already visited stay applied.
    pub async fn walk_reverse_topo<F, Fut, T, E>(&self, mut visit: F) -> Result<Vec<T>, E>
    where
        F: FnMut(&ObjectVertex) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<GraphError>,
    {
        let order = self.topo_order()?;
        let mut out = Vec::with_capacity(order.len());
        for id in order {
            if let Some(v) = self.slots[id.0].as_ref() {
                out.push(visit(v).await?);
            }
        }
        Ok(out)
    }

    pub(crate) fn delta_from(&self, base: &Dag) -> DagDelta {
        let mut d = DagDelta::default();
        for v in self.vertices() {
            if base.vertex(&v.key()) != Some(v) {
                d.upserts.push(v.clone());
            }
        }
        for v in base.vertices() {
            let key = v.key();
            if !self.contains(&key) {
                d.removals.push(key);
            }
        }
        let (mine, theirs) = (self.edges(), base.edges());
        d.edges_added = mine.difference(&theirs).cloned().collect();
        d.edges_removed = theirs.difference(&mine).cloned().collect();
        d
    }

    pub(crate) fn apply_delta(&mut self, d: DagDelta) -> Result<(), GraphError> {
        for key in &d.removals {
            self.remove_vertex(key);
        }
        for v in d.upserts {
            match self.vertex_mut(&v.key()) {
                Some(slot) => *slot = v,
                None => {
                    self.add_vertex(v)?;
                }
            }
        }
        for (from, to) in &d.edges_removed {
            if self.contains(from) && self.contains(to) {
                self.disconnect(from, to)?;
            }
        }
        for (from, to) in &d.edges_added {
            self.connect(from, to)?;
        }
        Ok(())
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges = self.edges();
        for v in self.vertices() {
            let key = v.key();
            let deps: Vec<String> = edges.iter().filter(|(a, _)| *a == key).map(|(_, b)| b.to_string()).collect();
            writeln!(f, "{} {} -> [{}]", v.action, key, deps.join(", "))?;
        }
        Ok(())
    }
}
