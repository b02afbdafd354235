//! Transformers turning a (current, desired) tree pair into intents.

use std::sync::Arc;

use async_trait::async_trait;
use orka_core::{Kind, Object, ObjectKey, ObjectTree};
use orka_graph::{merge_patch, Dag, ObjectVertex, PlanError, TransformContext, Transformer};

fn differs(current: &Object, desired: &Object) -> Result<bool, PlanError> {
    let patch = merge_patch::object_patch(current, desired)
        .map_err(|e| PlanError::Transformer { name: "diff", source: e.into() })?;
    Ok(!merge_patch::is_empty(&patch))
}

/// Create, patch or delete replica units.
pub struct ChildrenDiffTransformer {
    current: Arc<ObjectTree>,
    desired: Arc<ObjectTree>,
}

impl ChildrenDiffTransformer {
    pub fn new(current: Arc<ObjectTree>, desired: Arc<ObjectTree>) -> Self { Self { current, desired } }
}

#[async_trait]
impl Transformer for ChildrenDiffTransformer {
    fn name(&self) -> &'static str { "children-diff" }

    async fn transform(&self, _ctx: &TransformContext, dag: &mut Dag) -> Result<(), PlanError> {
        for want in self.desired.children() {
            let vertex = match self.current.get(&want.key()) {
                None => ObjectVertex::create(want.clone()),
                Some(have) if differs(have, want)? => ObjectVertex::patch(have.clone(), want.clone()),
                Some(_) => continue,
            };
            dag.add_vertex(vertex)?;
        }
        for have in self.current.children() {
            if !self.desired.contains(&have.key()) {
                dag.add_vertex(ObjectVertex::delete(have.clone()))?;
            }
        }
        Ok(())
    }
}

/// Finalizer, status and teardown intents for the root.
pub struct RootDiffTransformer {
    current: Arc<ObjectTree>,
    desired: Arc<ObjectTree>,
}

impl RootDiffTransformer {
    pub fn new(current: Arc<ObjectTree>, desired: Arc<ObjectTree>) -> Self { Self { current, desired } }
}

#[async_trait]
impl Transformer for RootDiffTransformer {
    fn name(&self) -> &'static str { "root-diff" }

    async fn transform(&self, _ctx: &TransformContext, dag: &mut Dag) -> Result<(), PlanError> {
        let (Some(have), Some(want)) = (self.current.root(), self.desired.root()) else { return Ok(()) };
        let vertex = if want.is_deleting() && self.desired.list(Kind::Pod).next().is_none() {
            ObjectVertex::delete(want.clone())
        } else if differs(have, want)? {
            // Status waits for the next pass; one intent per object.
            ObjectVertex::patch(have.clone(), want.clone())
        } else if have.as_workload().map(|w| &w.status) != want.as_workload().map(|w| &w.status) {
            ObjectVertex::status(want.clone())
        } else {
            return Ok(());
        };
        dag.add_vertex(vertex)?;
        Ok(())
    }
}

/// Orders the root's intent after every other intent in the graph.
pub struct RootDependencyTransformer {
    root: ObjectKey,
}

impl RootDependencyTransformer {
    pub fn new(root: ObjectKey) -> Self { Self { root } }
}

#[async_trait]
impl Transformer for RootDependencyTransformer {
    fn name(&self) -> &'static str { "root-dependency" }

    async fn transform(&self, _ctx: &TransformContext, dag: &mut Dag) -> Result<(), PlanError> {
        if !dag.contains(&self.root) {
            return Ok(());
        }
        let others: Vec<ObjectKey> = dag.vertices().map(ObjectVertex::key).filter(|k| *k != self.root).collect();
        for k in &others {
            dag.connect(&self.root, k)?;
        }
        Ok(())
    }
}
