//! Controller configuration with `ORKA_*` environment overrides.

use thiserror::Error;
use tracing::debug;

use crate::{FINALIZER, INSTANCE_LABEL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
    #[error("{var}={value} is not a qualified name (expected prefix/name)")]
    Unqualified { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Field manager sent with every write.
    pub field_manager: String,
    /// Finalizer placed on workloads and replica units.
    pub finalizer: String,
    /// Label key tying replica units to their workload.
    pub instance_label: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            field_manager: "orka".to_string(),
            finalizer: FINALIZER.to_string(),
            instance_label: INSTANCE_LABEL.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `ORKA_FIELD_MANAGER`, `ORKA_FINALIZER`, `ORKA_INSTANCE_LABEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("ORKA_FIELD_MANAGER") {
            cfg.field_manager = non_empty("ORKA_FIELD_MANAGER", v)?;
        }
        if let Some(v) = lookup("ORKA_FINALIZER") {
            cfg.finalizer = qualified("ORKA_FINALIZER", non_empty("ORKA_FINALIZER", v)?)?;
        }
        if let Some(v) = lookup("ORKA_INSTANCE_LABEL") {
            cfg.instance_label = non_empty("ORKA_INSTANCE_LABEL", v)?;
        }
        debug!(field_manager = %cfg.field_manager, finalizer = %cfg.finalizer, instance_label = %cfg.instance_label, "controller config loaded");
        Ok(cfg)
    }
}

fn non_empty(var: &'static str, v: String) -> Result<String, ConfigError> {
    let v = v.trim().to_string();
    if v.is_empty() { Err(ConfigError::Empty { var }) } else { Ok(v) }
}

fn qualified(var: &'static str, v: String) -> Result<String, ConfigError> {
    match v.split_once('/') {
        Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => Ok(v),
        _ => Err(ConfigError::Unqualified { var, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.finalizer, FINALIZER);
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ControllerConfig::from_lookup(lookup(&[("ORKA_FIELD_MANAGER", " rsm "), ("ORKA_FINALIZER", "x.io/f")])).unwrap();
        assert_eq!(cfg.field_manager, "rsm");
        assert_eq!(cfg.finalizer, "x.io/f");
    }

    #[test]
    fn bad_values_are_rejected() {
        let e = ControllerConfig::from_lookup(lookup(&[("ORKA_FIELD_MANAGER", "  ")])).unwrap_err();
        assert_eq!(e, ConfigError::Empty { var: "ORKA_FIELD_MANAGER" });
        let e = ControllerConfig::from_lookup(lookup(&[("ORKA_FINALIZER", "plain")])).unwrap_err();
        assert!(matches!(e, ConfigError::Unqualified { .. }));
    }
}
