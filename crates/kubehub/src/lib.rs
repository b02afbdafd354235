//! Orka kubehub: live Kubernetes implementation of the cluster client seam,
//! event publishing and workload watch wiring.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    runtime::{
        events::{Event as KubeEvent, EventType as KubeEventType, Recorder, Reporter},
        watcher::{self, Event},
    },
    Client,
};
use metrics::counter;
use orka_core::{Kind, Object, ObjectKey, Scheme};
use orka_graph::{merge_patch, ClientError, ClusterClient, ClusterReader, EventRecorder, EventType, WriteOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Build a kube client from the ambient kubeconfig or in-cluster env.
pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client")
}

/// `ApiResource` for `kind` from the process scheme.
pub fn api_resource(kind: Kind) -> Result<ApiResource> {
    let info = Scheme::global().lookup(kind)?;
    let gvk = GroupVersionKind::gvk(&info.group, &info.version, &info.kind);
    Ok(ApiResource::from_gvk_with_plural(&gvk, &info.plural))
}

/// Map kube errors onto the client seam's expected-absence taxonomy.
pub fn classify(key: &ObjectKey, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound(key.clone()),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => ClientError::AlreadyExists(key.clone()),
        kube::Error::Api(ae) if ae.code == 409 => ClientError::Conflict { key: key.clone(), message: ae.message },
        other => ClientError::Other(anyhow::Error::new(other).context(format!("request for {key}"))),
    }
}

fn to_dynamic(obj: &Object) -> Result<DynamicObject, ClientError> {
    let v = obj.to_json().map_err(|e| ClientError::Other(e.into()))?;
    serde_json::from_value(v).map_err(|e| ClientError::Other(e.into()))
}

fn from_dynamic(kind: Kind, obj: DynamicObject) -> Result<Object, ClientError> {
    let v = serde_json::to_value(obj).map_err(|e| ClientError::Other(e.into()))?;
    Object::from_json(kind, v).map_err(|e| ClientError::Other(e.into()))
}

fn selector(labels: &BTreeMap<String, String>) -> String {
    labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn post_params(opts: &WriteOptions) -> PostParams {
    PostParams { field_manager: Some(opts.field_manager.clone()).filter(|f| !f.is_empty()), ..Default::default() }
}

/// Cluster client backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self { Self { client } }

    pub async fn try_default() -> Result<Self> { Ok(Self::new(get_kube_client().await?)) }

    pub fn client(&self) -> &Client { &self.client }

    fn api(&self, kind: Kind, namespace: &str) -> Result<Api<DynamicObject>, ClientError> {
        let ar = api_resource(kind).map_err(ClientError::Other)?;
        Ok(if namespace.is_empty() {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        })
    }

    fn api_for(&self, key: &ObjectKey) -> Result<Api<DynamicObject>, ClientError> { self.api(key.kind, &key.namespace) }
}

#[async_trait]
impl ClusterReader for KubeCluster {
    async fn get(&self, key: &ObjectKey) -> Result<Object, ClientError> {
        let obj = self.api_for(key)?.get(&key.name).await.map_err(|e| classify(key, e))?;
        from_dynamic(key.kind, obj)
    }

    async fn list(&self, kind: Kind, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Object>, ClientError> {
        let lp = ListParams::default().labels(&selector(labels));
        let scope = ObjectKey::new(kind, namespace, "");
        let list = self.api(kind, namespace)?.list(&lp).await.map_err(|e| classify(&scope, e))?;
        list.items.into_iter().map(|o| from_dynamic(kind, o)).collect()
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        self.api_for(&key)?.create(&post_params(opts), &to_dynamic(obj)?).await.map_err(|e| classify(&key, e))?;
        counter!("kube_writes_total", 1u64, "verb" => "create");
        Ok(())
    }

    async fn update(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        self.api_for(&key)?
            .replace(&key.name, &post_params(opts), &to_dynamic(obj)?)
            .await
            .map_err(|e| classify(&key, e))?;
        counter!("kube_writes_total", 1u64, "verb" => "update");
        Ok(())
    }

    async fn patch(&self, base: &Object, target: &Object, opts: &WriteOptions) -> Result<(), ClientError> {
        let key = target.key();
        let patch = merge_patch::object_patch(base, target).map_err(|e| ClientError::Other(e.into()))?;
        if merge_patch::is_empty(&patch) {
            debug!(object = %key, "empty patch skipped");
            return Ok(());
        }
        let pp = PatchParams { field_manager: Some(opts.field_manager.clone()).filter(|f| !f.is_empty()), ..Default::default() };
        self.api_for(&key)?.patch(&key.name, &pp, &Patch::Merge(&patch)).await.map_err(|e| classify(&key, e))?;
        counter!("kube_writes_total", 1u64, "verb" => "patch");
        Ok(())
    }

    async fn delete(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        let mut dp = DeleteParams::default();
        if opts.orphan {
            dp.propagation_policy = Some(PropagationPolicy::Orphan);
        }
        self.api_for(&key)?.delete(&key.name, &dp).await.map_err(|e| classify(&key, e))?;
        counter!("kube_writes_total", 1u64, "verb" => "delete");
        Ok(())
    }

    async fn update_status(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        let body = serde_json::to_vec(&to_dynamic(obj)?).map_err(|e| ClientError::Other(e.into()))?;
        self.api_for(&key)?.replace_status(&key.name, &post_params(opts), body).await.map_err(|e| classify(&key, e))?;
        counter!("kube_writes_total", 1u64, "verb" => "status");
        Ok(())
    }
}

/// Publishes events through the events API on a background task.
#[derive(Clone)]
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller: &str) -> Self {
        Self { client, reporter: Reporter { controller: controller.to_string(), instance: std::env::var("HOSTNAME").ok() } }
    }
}

fn reference(key: &ObjectKey) -> ObjectReference {
    let api_version = Scheme::global().lookup(key.kind).map(|t| t.api_version()).unwrap_or_else(|_| key.kind.api_version().to_string());
    ObjectReference {
        api_version: Some(api_version),
        kind: Some(key.kind.as_str().to_string()),
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()).filter(|n| !n.is_empty()),
        ..Default::default()
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, regarding: &ObjectKey, type_: EventType, reason: &str, message: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(object = %regarding, reason, "no runtime, event dropped");
            return;
        };
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), reference(regarding));
        let ev = KubeEvent {
            type_: match type_ {
                EventType::Normal => KubeEventType::Normal,
                EventType::Warning => KubeEventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        let key = regarding.clone();
        handle.spawn(async move {
            if let Err(e) = recorder.publish(ev).await {
                warn!(object = %key, error = %e, "event publish failed");
            }
        });
    }
}

/// List+watch workloads and send the key of every observed change.
/// Consumers reconcile keys serially.
pub async fn watch_workloads(client: Client, namespace: Option<&str>, tx: mpsc::Sender<ObjectKey>) -> Result<()> {
    let ar = api_resource(Kind::ReplicatedStateMachine)?;
    let api: Api<DynamicObject> = match namespace {
        Some(ns) => Api::namespaced_with(client, ns, &ar),
        None => Api::all_with(client, &ar),
    };
    let stream = watcher::watcher(api, watcher::Config::default());
    futures::pin_mut!(stream);
    info!(ns = ?namespace, "workload watcher started");
    while let Some(ev) = stream.try_next().await? {
        let objs = match ev {
            Event::Applied(o) | Event::Deleted(o) => vec![o],
            Event::Restarted(list) => {
                debug!(count = list.len(), "watch restart");
                list
            }
        };
        for o in objs {
            let key = ObjectKey::new(Kind::ReplicatedStateMachine, o.metadata.namespace.unwrap_or_default(), o.metadata.name.unwrap_or_default());
            if tx.send(key).await.is_err() {
                info!("trigger receiver gone, watcher stopping");
                return Ok(());
            }
        }
    }
    warn!("watcher stream ended");
    Ok(())
}
