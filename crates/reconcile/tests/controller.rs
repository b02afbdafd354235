use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use orka_core::{
    ControllerConfig, InstanceTemplate, Kind, Object, ObjectKey, PodManagementPolicy, ReplicatedStateMachine, FINALIZER,
    INSTANCE_LABEL,
};
use orka_graph::{ClusterClient, EventRecorder, EventType, PlanError, WriteOptions};
use orka_reconcile::{Controller, ReconcileError};
use orka_store::MemoryCluster;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Events(Mutex<Vec<(EventType, String)>>);

impl EventRecorder for Events {
    fn record(&self, _regarding: &ObjectKey, type_: EventType, reason: &str, _message: &str) {
        if let Ok(mut v) = self.0.lock() {
            v.push((type_, reason.to_string()));
        }
    }
}

impl Events {
    fn reasons(&self) -> Vec<(EventType, String)> { self.0.lock().unwrap().clone() }
}

fn workload(policy: PodManagementPolicy) -> ReplicatedStateMachine {
    ReplicatedStateMachine::new("default", "bar")
        .with_replicas(7)
        .with_policy(policy)
        .with_instance(InstanceTemplate::named("hello"))
        .with_instance(InstanceTemplate::generated("foo", 2))
}

fn unit(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            labels: Some([(INSTANCE_LABEL.to_string(), "bar".to_string())].into()),
            finalizers: Some(vec![FINALIZER.to_string()]),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn key() -> ObjectKey { ObjectKey::new(Kind::ReplicatedStateMachine, "default", "bar") }

fn setup(w: ReplicatedStateMachine, units: &[&str]) -> (Arc<MemoryCluster>, Arc<Events>, Controller<MemoryCluster>) {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.seed(w).unwrap();
    for u in units {
        cluster.seed(unit(u)).unwrap();
    }
    let events = Arc::new(Events::default());
    let ctl = Controller::new(cluster.clone(), events.clone(), ControllerConfig::default());
    (cluster, events, ctl)
}

fn units(c: &MemoryCluster) -> Vec<String> { c.names(Kind::Pod, "default") }

fn sorted(v: &[&str]) -> Vec<String> {
    let mut v: Vec<String> = v.iter().map(|s| s.to_string()).collect();
    v.sort();
    v
}

#[tokio::test]
async fn ordered_ready_pass_fills_lowest_missing_unit() {
    let (cluster, events, ctl) = setup(workload(PodManagementPolicy::OrderedReady), &["foo-0", "bar-1"]);
    let s = ctl.reconcile(&key()).await.unwrap();
    assert!(s.found);
    assert_eq!((s.created, s.patched, s.deleted), (1, 1, 0));
    assert_eq!(units(&cluster), sorted(&["foo-0", "bar-0", "bar-1"]));

    let root = cluster.object(&key()).unwrap();
    assert!(root.has_finalizer(FINALIZER));
    let bar0 = cluster.object(&ObjectKey::new(Kind::Pod, "default", "bar-0")).unwrap();
    assert_eq!(bar0.meta().owner_references.as_ref().unwrap()[0].uid, root.meta().uid.clone().unwrap());
    assert_eq!(events.reasons(), vec![(EventType::Normal, "Reconciled".to_string())]);
}

#[tokio::test]
async fn ordered_ready_converges_and_settles() {
    let (cluster, _events, ctl) = setup(workload(PodManagementPolicy::OrderedReady), &["foo-0", "bar-1"]);
    let mut passes = 0;
    loop {
        let s = ctl.reconcile(&key()).await.unwrap();
        assert!(s.created + s.deleted <= 1);
        passes += 1;
        if s.is_settled() {
            break;
        }
        assert!(passes < 20, "did not settle");
    }
    assert_eq!(units(&cluster), sorted(&["hello", "foo-0", "foo-1", "bar-0", "bar-1", "bar-2", "bar-3"]));
    let root = cluster.object(&key()).unwrap();
    let status = root.as_workload().unwrap().status_or_default();
    assert_eq!(status.replicas, 7);
    assert_eq!(status.update_revisions.len(), 7);

    cluster.clear_journal();
    let s = ctl.reconcile(&key()).await.unwrap();
    assert!(s.is_settled());
    assert!(cluster.journal().is_empty());
}

#[tokio::test]
async fn parallel_pass_creates_everything_at_once() {
    let (cluster, _events, ctl) = setup(workload(PodManagementPolicy::Parallel), &["foo-0", "bar-1"]);
    let s = ctl.reconcile(&key()).await.unwrap();
    assert_eq!(s.created, 5);
    assert_eq!(units(&cluster), sorted(&["hello", "foo-0", "foo-1", "bar-0", "bar-1", "bar-2", "bar-3"]));
}

#[tokio::test]
async fn ordered_scale_down_removes_highest_first() {
    let w = ReplicatedStateMachine::new("default", "bar").with_replicas(1);
    let (cluster, _events, ctl) = setup(w, &["bar-0", "bar-1", "bar-2"]);
    let s = ctl.reconcile(&key()).await.unwrap();
    assert_eq!(s.deleted, 1);
    assert_eq!(units(&cluster), sorted(&["bar-0", "bar-1"]));
    ctl.reconcile(&key()).await.unwrap();
    assert_eq!(units(&cluster), sorted(&["bar-0"]));
}

#[tokio::test]
async fn deleted_workload_is_torn_down_and_released() {
    let mut w = workload(PodManagementPolicy::OrderedReady);
    w.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    let (cluster, _events, ctl) = setup(w, &["foo-0", "bar-1"]);
    let live = cluster.object(&key()).unwrap();
    cluster.delete(&live, &WriteOptions::default()).await.unwrap();
    assert!(cluster.object(&key()).unwrap().is_deleting());

    let s = ctl.reconcile(&key()).await.unwrap();
    assert_eq!(s.deleted, 3);
    assert!(units(&cluster).is_empty());
    assert!(cluster.object(&key()).is_none());

    let s = ctl.reconcile(&key()).await.unwrap();
    assert!(!s.found);
}

#[tokio::test]
async fn invalid_spec_fails_without_writes() {
    let w = workload(PodManagementPolicy::Parallel).with_instance(InstanceTemplate::named("foo-1"));
    let (cluster, events, ctl) = setup(w, &[]);
    let err = ctl.reconcile(&key()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::NameCollision(ref n) if n == "foo-1"));
    assert!(err.is_config());
    assert!(cluster.journal().is_empty());
    assert_eq!(events.reasons(), vec![(EventType::Warning, "InvalidSpec".to_string())]);
}

#[tokio::test]
async fn cancelled_controller_writes_nothing() {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.seed(workload(PodManagementPolicy::Parallel)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctl = Controller::new(cluster.clone(), Arc::new(Events::default()), ControllerConfig::default())
        .with_cancellation(cancel);
    let err = ctl.reconcile(&key()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Plan(PlanError::Cancelled)));
    assert!(cluster.journal().is_empty());
}

#[tokio::test]
async fn units_of_other_workloads_are_ignored() {
    let (cluster, _events, ctl) = setup(ReplicatedStateMachine::new("default", "bar").with_replicas(1), &[]);
    let mut stranger = unit("other-0");
    stranger.metadata.labels = Some([(INSTANCE_LABEL.to_string(), "other".to_string())].into());
    cluster.seed(Object::Pod(stranger)).unwrap();
    ctl.reconcile(&key()).await.unwrap();
    assert_eq!(units(&cluster), sorted(&["bar-0", "other-0"]));
}
