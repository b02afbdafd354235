//! Orka in-memory cluster: a small API-server stand-in implementing the
//! cluster client seam. Used by tests and by `orkactl simulate`.
//!
//! Semantics follow the real control plane closely enough for reconciliation:
//! optimistic concurrency on `resourceVersion`, finalizer-gated deletion,
//! owner-reference cascade, and no-op writes that do not bump versions.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use metrics::counter;
use orka_core::{Kind, Object, ObjectKey};
use orka_graph::{merge_patch, ClientError, ClusterClient, ClusterReader, WriteOptions};
use tracing::debug;
use uuid::Uuid;

/// Effective write recorded by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Patch,
    Status,
    /// Deletion timestamp set; finalizers still pending.
    MarkDeleting,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub key: ObjectKey,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, Object>,
    next_rv: u64,
    journal: Vec<Mutation>,
    fail_on: BTreeMap<ObjectKey, String>,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn record(&mut self, kind: MutationKind, key: &ObjectKey) {
        debug!(?kind, object = %key, "store mutation");
        counter!("store_mutations_total", 1u64);
        self.journal.push(Mutation { kind, key: key.clone() });
    }

    fn injected(&mut self, key: &ObjectKey) -> Result<(), ClientError> {
        match self.fail_on.remove(key) {
            Some(msg) => Err(ClientError::Other(anyhow!(msg))),
            None => Ok(()),
        }
    }

    fn live(&self, key: &ObjectKey) -> Result<&Object, ClientError> {
        self.objects.get(key).ok_or_else(|| ClientError::NotFound(key.clone()))
    }

    /// Store `obj` under its key, bumping the version, or drop it when it is
    /// deleting and no finalizers remain.
    fn commit(&mut self, mut obj: Object, kind: MutationKind) {
        let key = obj.key();
        if obj.is_deleting() && obj.meta().finalizers.as_ref().map_or(true, Vec::is_empty) {
            self.remove(&key, true);
            return;
        }
        obj.meta_mut().resource_version = Some(self.bump());
        self.objects.insert(key.clone(), obj);
        self.record(kind, &key);
    }

    /// Finalizers pending: mark. Otherwise remove.
    fn delete(&mut self, key: &ObjectKey, cascade: bool) {
        let Some(obj) = self.objects.get(key).cloned() else { return };
        if obj.meta().finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            if !obj.is_deleting() {
                let mut marked = obj;
                marked.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
                self.commit(marked, MutationKind::MarkDeleting);
            }
            return;
        }
        self.remove(key, cascade);
    }

    /// Drop `key`; with `cascade`, delete everything it owns.
    fn remove(&mut self, key: &ObjectKey, cascade: bool) {
        let Some(obj) = self.objects.remove(key) else { return };
        self.record(MutationKind::Remove, key);
        if !cascade {
            return;
        }
        let Some(uid) = obj.meta().uid.clone() else { return };
        let owned: Vec<ObjectKey> = self
            .objects
            .iter()
            .filter(|(_, o)| o.meta().owner_references.as_ref().is_some_and(|refs| refs.iter().any(|r| r.uid == uid)))
            .map(|(k, _)| k.clone())
            .collect();
        for k in owned {
            self.delete(&k, true);
        }
    }
}

#[derive(Default)]
pub struct MemoryCluster {
    inner: Mutex<Inner>,
}

/// Copy `from`'s status onto `to` (status only changes through the status subresource).
fn with_status_of(to: &Object, from: &Object) -> Object {
    let mut out = to.clone();
    match (&mut out, from) {
        (Object::Workload(o), Object::Workload(f)) => o.status = f.status.clone(),
        (Object::Pod(o), Object::Pod(f)) => o.status = f.status.clone(),
        _ => {}
    }
    out
}

/// Restore what only the server may set: identity, timestamps and status.
fn keep_server_fields(next: &mut Object, live: &Object) {
    *next = with_status_of(next, live);
    let (m, l) = (next.meta_mut(), live.meta());
    m.uid = l.uid.clone();
    m.creation_timestamp = l.creation_timestamp.clone();
    m.deletion_timestamp = l.deletion_timestamp.clone();
    m.generation = l.generation;
}

/// Equal apart from the version stamp.
fn same_content(a: &Object, b: &Object) -> bool {
    let (mut a, mut b) = (a.clone(), b.clone());
    a.meta_mut().resource_version = None;
    b.meta_mut().resource_version = None;
    a == b
}

fn spec_json(obj: &Object) -> Option<serde_json::Value> {
    obj.to_json().ok().and_then(|v| v.get("spec").cloned())
}

impl MemoryCluster {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ClientError> {
        self.inner.lock().map_err(|_| ClientError::Other(anyhow!("memory cluster lock poisoned")))
    }

    /// Insert an object as if it had been created earlier, without journaling.
    pub fn seed(&self, obj: impl Into<Object>) -> Result<(), ClientError> {
        let mut obj = obj.into();
        let mut inner = self.lock()?;
        let meta = obj.meta_mut();
        meta.uid.get_or_insert_with(|| Uuid::new_v4().to_string());
        meta.generation.get_or_insert(1);
        inner.next_rv += 1;
        obj.meta_mut().resource_version = Some(inner.next_rv.to_string());
        inner.objects.insert(obj.key(), obj);
        Ok(())
    }

    pub fn object(&self, key: &ObjectKey) -> Option<Object> {
        self.lock().ok()?.objects.get(key).cloned()
    }

    /// Names of stored objects of `kind` in `namespace`, sorted.
    pub fn names(&self, kind: Kind, namespace: &str) -> Vec<String> {
        let Ok(inner) = self.lock() else { return Vec::new() };
        inner.objects.keys().filter(|k| k.kind == kind && k.namespace == namespace).map(|k| k.name.clone()).collect()
    }

    pub fn journal(&self) -> Vec<Mutation> {
        self.lock().map(|i| i.journal.clone()).unwrap_or_default()
    }

    pub fn clear_journal(&self) {
        if let Ok(mut i) = self.lock() {
            i.journal.clear();
        }
    }

    /// Make the next write to `key` fail with an unexpected error.
    pub fn fail_next_write(&self, key: ObjectKey, message: &str) {
        if let Ok(mut i) = self.lock() {
            i.fail_on.insert(key, message.to_string());
        }
    }
}

#[async_trait]
impl ClusterReader for MemoryCluster {
    async fn get(&self, key: &ObjectKey) -> Result<Object, ClientError> {
        self.lock()?.live(key).cloned()
    }

    async fn list(&self, kind: Kind, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Object>, ClientError> {
        let inner = self.lock()?;
        Ok(inner
            .objects
            .iter()
            .filter(|(k, _)| k.kind == kind && k.namespace == namespace)
            .filter(|(_, o)| {
                let have = o.meta().labels.as_ref();
                labels.iter().all(|(lk, lv)| have.and_then(|m| m.get(lk)) == Some(lv))
            })
            .map(|(_, o)| o.clone())
            .collect())
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn create(&self, obj: &Object, _opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        let mut inner = self.lock()?;
        inner.injected(&key)?;
        if inner.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(key));
        }
        let mut obj = obj.clone();
        let meta = obj.meta_mut();
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.generation = Some(1);
        meta.creation_timestamp = Some(Time(chrono::Utc::now()));
        meta.deletion_timestamp = None;
        inner.commit(obj, MutationKind::Create);
        Ok(())
    }

    async fn update(&self, obj: &Object, _opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        let mut inner = self.lock()?;
        inner.injected(&key)?;
        let live = inner.live(&key)?.clone();
        let mut next = obj.clone();
        keep_server_fields(&mut next, &live);
        if same_content(&next, &live) {
            return Ok(());
        }
        if let Some(rv) = obj.meta().resource_version.as_deref() {
            if Some(rv) != live.meta().resource_version.as_deref() {
                return Err(ClientError::Conflict { key, message: format!("stale resourceVersion {}", rv) });
            }
        }
        if spec_json(&next) != spec_json(&live) {
            next.meta_mut().generation = Some(live.meta().generation.unwrap_or(0) + 1);
        }
        inner.commit(next, MutationKind::Update);
        Ok(())
    }

    async fn patch(&self, base: &Object, target: &Object, _opts: &WriteOptions) -> Result<(), ClientError> {
        let key = target.key();
        let mut inner = self.lock()?;
        inner.injected(&key)?;
        let live = inner.live(&key)?.clone();
        let patch = merge_patch::object_patch(base, target).map_err(|e| ClientError::Other(e.into()))?;
        if merge_patch::is_empty(&patch) {
            return Ok(());
        }
        let mut doc = live.to_json().map_err(|e| ClientError::Other(e.into()))?;
        merge_patch::apply(&mut doc, &patch);
        let mut next = Object::from_json(key.kind, doc).map_err(|e| ClientError::Other(e.into()))?;
        keep_server_fields(&mut next, &live);
        if same_content(&next, &live) {
            return Ok(());
        }
        if spec_json(&next) != spec_json(&live) {
            next.meta_mut().generation = Some(live.meta().generation.unwrap_or(0) + 1);
        }
        inner.commit(next, MutationKind::Patch);
        Ok(())
    }

    async fn delete(&self, obj: &Object, opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        let mut inner = self.lock()?;
        inner.injected(&key)?;
        inner.live(&key)?;
        inner.delete(&key, !opts.orphan);
        Ok(())
    }

    async fn update_status(&self, obj: &Object, _opts: &WriteOptions) -> Result<(), ClientError> {
        let key = obj.key();
        let mut inner = self.lock()?;
        inner.injected(&key)?;
        let live = inner.live(&key)?.clone();
        let next = with_status_of(&live, obj);
        if same_content(&next, &live) {
            return Ok(());
        }
        inner.commit(next, MutationKind::Status);
        Ok(())
    }
}
