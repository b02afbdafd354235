//! Loads a workload and its replica units into an [`ObjectTree`].
//!
//! Each step is skipped once an earlier one failed or found no root; the
//! outcome is read once through [`Fetcher::complete`].

use std::collections::BTreeMap;

use orka_core::{Kind, ObjectKey, ObjectTree};
use orka_graph::{ClientError, ClusterReader};
use tracing::debug;

pub struct Fetcher<'a> {
    reader: &'a dyn ClusterReader,
    key: ObjectKey,
    tree: ObjectTree,
    missing: bool,
    err: Option<ClientError>,
}

impl<'a> Fetcher<'a> {
    pub fn new(reader: &'a dyn ClusterReader, key: ObjectKey) -> Self {
        Self { reader, key, tree: ObjectTree::new(), missing: false, err: None }
    }

    fn skip(&self) -> bool { self.missing || self.err.is_some() }

    pub async fn root(mut self) -> Self {
        if self.skip() {
            return self;
        }
        match self.reader.get(&self.key).await {
            Ok(obj) => {
                if let Err(e) = self.tree.set_root(obj) {
                    self.err = Some(ClientError::Other(e.into()));
                }
            }
            Err(e) if e.is_not_found() => {
                debug!(object = %self.key, "root not found");
                self.missing = true;
            }
            Err(e) => self.err = Some(e),
        }
        self
    }

    /// Add every `kind` object in the root's namespace carrying `labels`.
    pub async fn children(mut self, kind: Kind, labels: &BTreeMap<String, String>) -> Self {
        if self.skip() {
            return self;
        }
        match self.reader.list(kind, &self.key.namespace, labels).await {
            Ok(objs) => {
                debug!(object = %self.key, %kind, count = objs.len(), "children fetched");
                if let Err(e) = self.tree.add(objs) {
                    self.err = Some(ClientError::Other(e.into()));
                }
            }
            Err(e) => self.err = Some(e),
        }
        self
    }

    /// The tree, `None` when the root does not exist, or the first error.
    pub fn complete(self) -> Result<Option<ObjectTree>, ClientError> {
        match self.err {
            Some(e) => Err(e),
            None if self.missing => Ok(None),
            None => Ok(Some(self.tree)),
        }
    }
}
