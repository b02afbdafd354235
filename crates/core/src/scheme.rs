//! Type registry mapping object kinds to their API coordinates.
//!
//! A process installs one global scheme at startup via [`install_global`];
//! afterwards it is read-only. Tests build their own `Scheme` values instead
//! of touching the global one.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::object::Kind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemeError {
    #[error("kind {0} is not registered")]
    Unregistered(Kind),
    #[error("no registered kind for {api_version}/{kind}")]
    UnknownType { api_version: String, kind: String },
    #[error("global scheme already installed")]
    AlreadyInstalled,
}

/// API coordinates of a registered kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl TypeInfo {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheme {
    types: BTreeMap<Kind, TypeInfo>,
}

static GLOBAL: OnceCell<Scheme> = OnceCell::new();

/// Install the process-wide scheme. Fails if one is already in place.
pub fn install_global(scheme: Scheme) -> Result<(), SchemeError> {
    GLOBAL.set(scheme).map_err(|_| SchemeError::AlreadyInstalled)
}

impl Scheme {
    pub fn empty() -> Self { Self::default() }

    /// Scheme with every built-in kind registered.
    pub fn builtin() -> Self {
        let mut s = Self::empty();
        s.register(Kind::ReplicatedStateMachine, TypeInfo {
            group: "workloads.orka.io".into(),
            version: "v1alpha1".into(),
            kind: "ReplicatedStateMachine".into(),
            plural: "replicatedstatemachines".into(),
            namespaced: true,
        });
        s.register(Kind::Pod, TypeInfo {
            group: String::new(),
            version: "v1".into(),
            kind: "Pod".into(),
            plural: "pods".into(),
            namespaced: true,
        });
        s
    }

    /// The installed global scheme, or the built-in one when none was installed.
    pub fn global() -> &'static Scheme {
        GLOBAL.get_or_init(Scheme::builtin)
    }

    pub fn register(&mut self, kind: Kind, info: TypeInfo) -> &mut Self {
        self.types.insert(kind, info);
        self
    }

    pub fn lookup(&self, kind: Kind) -> Result<&TypeInfo, SchemeError> {
        self.types.get(&kind).ok_or(SchemeError::Unregistered(kind))
    }

    /// Resolve `apiVersion` + `kind` strings (as found in manifests).
    pub fn kind_for(&self, api_version: &str, kind: &str) -> Result<Kind, SchemeError> {
        self.types
            .iter()
            .find(|(_, t)| t.kind == kind && t.api_version() == api_version)
            .map(|(k, _)| *k)
            .ok_or_else(|| SchemeError::UnknownType { api_version: api_version.to_string(), kind: kind.to_string() })
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.types.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_manifest_types() {
        let s = Scheme::builtin();
        assert_eq!(s.kind_for("v1", "Pod").unwrap(), Kind::Pod);
        assert_eq!(
            s.kind_for("workloads.orka.io/v1alpha1", "ReplicatedStateMachine").unwrap(),
            Kind::ReplicatedStateMachine
        );
        assert!(matches!(s.kind_for("apps/v1", "StatefulSet"), Err(SchemeError::UnknownType { .. })));
    }

    #[test]
    fn isolated_scheme_does_not_see_builtin_kinds() {
        let mut s = Scheme::empty();
        assert_eq!(s.lookup(Kind::Pod).unwrap_err(), SchemeError::Unregistered(Kind::Pod));
        s.register(Kind::Pod, Scheme::builtin().lookup(Kind::Pod).unwrap().clone());
        assert_eq!(s.lookup(Kind::Pod).unwrap().plural, "pods");
        assert_eq!(s.kinds().count(), 1);
    }

    #[test]
    fn type_info_api_version_handles_core_group() {
        let s = Scheme::builtin();
        assert_eq!(s.lookup(Kind::Pod).unwrap().api_version(), "v1");
        assert_eq!(s.lookup(Kind::ReplicatedStateMachine).unwrap().api_version(), "workloads.orka.io/v1alpha1");
    }
}
