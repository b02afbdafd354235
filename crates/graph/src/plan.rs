//! Plan building and execution.
//!
//! Dispatch is idempotent: an object that already exists satisfies a create
//! and an object that is gone satisfies every other action. Anything else
//! aborts the walk and is returned as-is; the outer loop re-derives a pass.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use orka_core::{ControllerConfig, Object};
use tracing::{debug, error, Instrument};

use crate::client::{ClusterClient, WriteOptions};
use crate::dag::{Action, Dag, ObjectVertex};
use crate::error::{ClientError, GraphError, PlanError};
use crate::transformer::{TransformContext, Transformer, TransformerChain};

/// Counts of dispatched intents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub created: usize,
    pub updated: usize,
    pub patched: usize,
    pub deleted: usize,
    pub status_updated: usize,
    /// Intents satisfied by the object already being (or not being) there.
    pub tolerated: usize,
}

impl PlanStats {
    fn count(&mut self, action: Action) {
        match action {
            Action::Create => self.created += 1,
            Action::Update => self.updated += 1,
            Action::Patch => self.patched += 1,
            Action::Delete => self.deleted += 1,
            Action::StatusUpdate => self.status_updated += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.patched + self.deleted + self.status_updated
    }
}

pub struct PlanBuilder {
    ctx: TransformContext,
    client: Arc<dyn ClusterClient>,
    field_manager: String,
    finalizer: String,
    chain: TransformerChain,
}

impl PlanBuilder {
    pub fn new(ctx: TransformContext, client: Arc<dyn ClusterClient>, config: &ControllerConfig) -> Self {
        Self {
            ctx,
            client,
            field_manager: config.field_manager.clone(),
            finalizer: config.finalizer.clone(),
            chain: TransformerChain::new(),
        }
    }

    pub fn add_transformer(mut self, t: impl Transformer + 'static) -> Self {
        self.chain.push(Box::new(t));
        self
    }

    /// Register transformers that run concurrently on copies of the graph.
    pub fn add_parallel_transformer(mut self, group: Vec<Box<dyn Transformer>>) -> Self {
        self.chain.push_parallel(group);
        self
    }

    /// Run the chain on a fresh graph and freeze it. Cycles fail here, before any write.
    pub async fn build(self) -> Result<Plan, PlanError> {
        let mut dag = Dag::new();
        let span = self.ctx.span().clone();
        self.chain.apply_to(&self.ctx, &mut dag).instrument(span).await?;
        dag.validate()?;
        debug!(vertices = dag.len(), "plan built\n{}", dag);
        Ok(Plan { dag, ctx: self.ctx, client: self.client, field_manager: self.field_manager, finalizer: self.finalizer })
    }
}

pub struct Plan {
    dag: Dag,
    ctx: TransformContext,
    client: Arc<dyn ClusterClient>,
    field_manager: String,
    finalizer: String,
}

impl Plan {
    pub fn dag(&self) -> &Dag { &self.dag }

    /// Walk the graph and dispatch each intent, one at a time.
    pub async fn execute(&self) -> Result<PlanStats, PlanError> {
        let t0 = Instant::now();
        let span = self.ctx.span().clone();
        let res = self.dag.walk_reverse_topo(move |v| self.dispatch(v.clone())).instrument(span).await;
        histogram!("plan_execute_ms", t0.elapsed().as_secs_f64() * 1000.0);
        let mut stats = PlanStats::default();
        for (action, applied) in res? {
            if applied {
                stats.count(action);
            } else {
                stats.tolerated += 1;
            }
        }
        Ok(stats)
    }

    /// Returns the action and whether it changed anything; `false` means the
    /// intent was already satisfied.
    async fn dispatch(&self, v: ObjectVertex) -> Result<(Action, bool), PlanError> {
        if self.ctx.is_cancelled() {
            return Err(PlanError::Cancelled);
        }
        let opts = WriteOptions::for_vertex(&v, &self.field_manager);
        let (action, key) = (v.action, v.key());
        let res = match action {
            Action::Create => tolerate(self.client.create(&v.obj, &opts).await, ClientError::is_already_exists),
            Action::Update => tolerate(self.client.update(&v.obj, &opts).await, ClientError::is_not_found),
            Action::Patch => {
                let Some(base) = v.ori_obj.as_ref() else {
                    return Err(GraphError::MissingPatchBase(key).into());
                };
                tolerate(self.client.patch(base, &v.obj, &opts).await, ClientError::is_not_found)
            }
            Action::StatusUpdate => tolerate(self.client.update_status(&v.obj, &opts).await, ClientError::is_not_found),
            Action::Delete => self.delete(v.obj, &opts).await,
        };
        let applied = res.map_err(|source| PlanError::Dispatch { action, key: key.clone(), source })?;
        counter!("plan_dispatch_total", 1u64, "action" => action.as_str());
        if applied {
            debug!(object = %key, %action, "dispatched");
        } else {
            counter!("plan_absence_tolerated_total", 1u64, "action" => action.as_str());
            debug!(object = %key, %action, "already satisfied");
        }
        Ok((action, applied))
    }

    async fn delete(&self, mut obj: Object, opts: &WriteOptions) -> Result<bool, ClientError> {
        if obj.remove_finalizer(&self.finalizer) {
            match self.client.update(&obj, opts).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(false),
                Err(e) => {
                    error!(object = %obj.key(), error = %e, "finalizer removal failed");
                    return Err(e);
                }
            }
        }
        if obj.is_deleting() {
            return Ok(true);
        }
        tolerate(self.client.delete(&obj, opts).await, ClientError::is_not_found)
    }
}

fn tolerate(res: Result<(), ClientError>, expected: fn(&ClientError) -> bool) -> Result<bool, ClientError> {
    match res {
        Ok(()) => Ok(true),
        Err(e) if expected(&e) => Ok(false),
        Err(e) => Err(e),
    }
}
