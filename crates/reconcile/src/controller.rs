//! One reconciliation pass for one workload: fetch, reconcile, plan, execute.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use orka_core::{ControllerConfig, Kind, ObjectKey};
use orka_graph::{
    ClusterClient, ClusterReader, EventRecorder, EventType, PlanBuilder, PlanStats, TransformContext, Transformer,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::alignment::ReplicasAlignmentReconciler;
use crate::error::ReconcileError;
use crate::fetch::Fetcher;
use crate::reconciler::ReconcilerChain;
use crate::revision::RevisionUpdateReconciler;
use crate::status::StatusReconciler;
use crate::transformers::{ChildrenDiffTransformer, RootDependencyTransformer, RootDiffTransformer};

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub workload: String,
    /// False when the workload no longer exists.
    pub found: bool,
    pub created: usize,
    pub updated: usize,
    pub patched: usize,
    pub deleted: usize,
    pub status_updated: usize,
    pub tolerated: usize,
}

impl PassSummary {
    fn new(key: &ObjectKey, found: bool, s: PlanStats) -> Self {
        Self {
            workload: key.to_string(),
            found,
            created: s.created,
            updated: s.updated,
            patched: s.patched,
            deleted: s.deleted,
            status_updated: s.status_updated,
            tolerated: s.tolerated,
        }
    }

    pub fn writes(&self) -> usize { self.created + self.updated + self.patched + self.deleted + self.status_updated }

    pub fn is_settled(&self) -> bool { self.writes() == 0 }
}

/// Default reconciler chain: revisions, then alignment, then status.
pub fn default_chain(config: &ControllerConfig) -> ReconcilerChain {
    ReconcilerChain::new()
        .with(RevisionUpdateReconciler::default())
        .with(ReplicasAlignmentReconciler::new(config.clone()))
        .with(StatusReconciler)
}

pub struct Controller<C> {
    client: Arc<C>,
    recorder: Arc<dyn EventRecorder>,
    config: ControllerConfig,
    chain: ReconcilerChain,
    cancel: CancellationToken,
}

impl<C: ClusterClient + 'static> Controller<C> {
    pub fn new(client: Arc<C>, recorder: Arc<dyn EventRecorder>, config: ControllerConfig) -> Self {
        let chain = default_chain(&config);
        Self { client, recorder, config, chain, cancel: CancellationToken::new() }
    }

    pub fn with_chain(mut self, chain: ReconcilerChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ControllerConfig { &self.config }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<PassSummary, ReconcileError> {
        let span = info_span!("reconcile", workload = %key);
        let t0 = Instant::now();
        let res = self.pass(key).instrument(span).await;
        histogram!("reconcile_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(_) => {
                counter!("reconcile_passes_total", 1u64, "result" => "ok");
            }
            Err(e) => {
                counter!("reconcile_passes_total", 1u64, "result" => "error");
                warn!(workload = %key, error = %e, config_error = e.is_config(), "reconcile failed");
                if e.is_config() {
                    self.recorder.record(key, EventType::Warning, "InvalidSpec", &e.to_string());
                }
            }
        }
        res
    }

    async fn pass(&self, key: &ObjectKey) -> Result<PassSummary, ReconcileError> {
        let reader: Arc<dyn ClusterReader> = self.client.clone();
        let selector: BTreeMap<String, String> = [(self.config.instance_label.clone(), key.name.clone())].into();
        let fetched = Fetcher::new(reader.as_ref(), key.clone())
            .root()
            .await
            .children(Kind::Pod, &selector)
            .await
            .complete()?;
        let Some(current) = fetched else {
            info!("workload gone, nothing to do");
            return Ok(PassSummary::new(key, false, PlanStats::default()));
        };

        let mut start = current.deep_copy();
        if let Some(root) = start.root_mut() {
            if !root.is_deleting() {
                root.add_finalizer(&self.config.finalizer);
            }
        }
        let desired = Arc::new(self.chain.run(&start)?);
        let current = Arc::new(current);

        let ctx = TransformContext::new(self.cancel.clone(), reader, self.recorder.clone(), tracing::Span::current());
        let client: Arc<dyn ClusterClient> = self.client.clone();
        let diff: Vec<Box<dyn Transformer>> = vec![
            Box::new(ChildrenDiffTransformer::new(current.clone(), desired.clone())) as Box<dyn Transformer>,
            Box::new(RootDiffTransformer::new(current, desired)),
        ];
        let plan = PlanBuilder::new(ctx, client, &self.config)
            .add_parallel_transformer(diff)
            .add_transformer(RootDependencyTransformer::new(key.clone()))
            .build()
            .await?;
        let stats = plan.execute().await?;
        let summary = PassSummary::new(key, true, stats);
        if !summary.is_settled() {
            let msg = format!(
                "created {}, patched {}, deleted {}, status {}",
                summary.created, summary.patched, summary.deleted, summary.status_updated
            );
            self.recorder.record(key, EventType::Normal, "Reconciled", &msg);
        }
        info!(writes = summary.writes(), tolerated = summary.tolerated, "pass complete");
        Ok(summary)
    }
}
