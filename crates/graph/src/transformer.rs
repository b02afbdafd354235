//! Transformers and the chain that applies them to a mutation graph.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use orka_core::ObjectKey;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Span};

use crate::client::{ClusterReader, EventRecorder};
use crate::dag::{Dag, DagDelta, ObjectVertex};
use crate::error::{GraphError, PlanError};

/// Read-only state shared by every transformer of one pass.
#[derive(Clone)]
pub struct TransformContext {
    cancel: CancellationToken,
    reader: Arc<dyn ClusterReader>,
    recorder: Arc<dyn EventRecorder>,
    span: Span,
}

impl TransformContext {
    pub fn new(cancel: CancellationToken, reader: Arc<dyn ClusterReader>, recorder: Arc<dyn EventRecorder>, span: Span) -> Self {
        Self { cancel, reader, recorder, span }
    }

    pub fn cancel_token(&self) -> &CancellationToken { &self.cancel }
    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }
    pub fn reader(&self) -> &dyn ClusterReader { self.reader.as_ref() }
    pub fn recorder(&self) -> &dyn EventRecorder { self.recorder.as_ref() }
    pub fn span(&self) -> &Span { &self.span }
}

/// One step of graph construction.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform(&self, ctx: &TransformContext, dag: &mut Dag) -> Result<(), PlanError>;
}

enum Stage {
    Single(Box<dyn Transformer>),
    Parallel(Vec<Box<dyn Transformer>>),
}

/// Transformers applied in registration order; parallel groups run together.
#[derive(Default)]
pub struct TransformerChain {
    stages: Vec<Stage>,
}

impl TransformerChain {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, t: Box<dyn Transformer>) {
        self.stages.push(Stage::Single(t));
    }

    pub fn push_parallel(&mut self, group: Vec<Box<dyn Transformer>>) {
        self.stages.push(Stage::Parallel(group));
    }

    pub fn len(&self) -> usize { self.stages.len() }

    pub fn is_empty(&self) -> bool { self.stages.is_empty() }

    pub async fn apply_to(&self, ctx: &TransformContext, dag: &mut Dag) -> Result<(), PlanError> {
        for stage in &self.stages {
            if ctx.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            match stage {
                Stage::Single(t) => {
                    debug!(transformer = t.name(), "applying transformer");
                    t.transform(ctx, dag).await?;
                }
                Stage::Parallel(group) => {
                    let names: Vec<_> = group.iter().map(|t| t.name()).collect();
                    debug!(transformers = ?names, "applying parallel transformers");
                    let base: &Dag = &*dag;
                    let runs = group.iter().map(|t| async move {
                        let mut copy = base.clone();
                        t.transform(ctx, &mut copy).await.map(|_| copy)
                    });
                    let copies = try_join_all(runs).await?;
                    let deltas: Vec<DagDelta> = copies.iter().map(|c| c.delta_from(dag)).collect();
                    merge(dag, deltas)?;
                }
            }
        }
        Ok(())
    }
}

/// Fold parallel deltas into `dag` in registration order. Two deltas that
/// leave the same object in different states conflict.
fn merge(dag: &mut Dag, deltas: Vec<DagDelta>) -> Result<(), GraphError> {
    {
        let mut touched: FxHashMap<ObjectKey, Option<&ObjectVertex>> = FxHashMap::default();
        for d in &deltas {
            for v in &d.upserts {
                claim(&mut touched, v.key(), Some(v))?;
            }
            for k in &d.removals {
                claim(&mut touched, k.clone(), None)?;
            }
        }
    }
    for (i, d) in deltas.iter().enumerate() {
        for e in &d.edges_added {
            if deltas.iter().enumerate().any(|(j, o)| j != i && o.edges_removed.contains(e)) {
                return Err(GraphError::MergeConflict(e.0.clone()));
            }
        }
    }
    for d in deltas {
        dag.apply_delta(d)?;
    }
    Ok(())
}

fn claim<'a>(
    touched: &mut FxHashMap<ObjectKey, Option<&'a ObjectVertex>>,
    key: ObjectKey,
    state: Option<&'a ObjectVertex>,
) -> Result<(), GraphError> {
    match touched.get(&key) {
        Some(prev) if *prev != state => Err(GraphError::MergeConflict(key)),
        Some(_) => Ok(()),
        None => {
            touched.insert(key, state);
            Ok(())
        }
    }
}
