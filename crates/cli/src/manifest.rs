//! Multi-document YAML manifests for `orkactl simulate`.

use anyhow::{anyhow, Context, Result};
use orka_core::{Kind, Object, Scheme};
use serde::Deserialize;

/// Parse every non-empty document into a typed object, resolving
/// `apiVersion`/`kind` through `scheme`.
pub fn parse(text: &str, scheme: &Scheme) -> Result<Vec<Object>> {
    let mut out = Vec::new();
    for (i, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let v = serde_json::Value::deserialize(doc).with_context(|| format!("document {i}"))?;
        if v.is_null() {
            continue;
        }
        let api_version = v.get("apiVersion").and_then(|x| x.as_str()).ok_or_else(|| anyhow!("document {i}: missing apiVersion"))?;
        let kind = v.get("kind").and_then(|x| x.as_str()).ok_or_else(|| anyhow!("document {i}: missing kind"))?;
        let kind = scheme.kind_for(api_version, kind).with_context(|| format!("document {i}"))?;
        let mut obj = Object::from_json(kind, v).with_context(|| format!("document {i}: decoding {kind}"))?;
        if obj.namespace().is_empty() {
            obj.meta_mut().namespace = Some("default".to_string());
        }
        out.push(obj);
    }
    Ok(out)
}

/// The single workload in `objects`.
pub fn workload(objects: &[Object]) -> Result<&Object> {
    let mut roots = objects.iter().filter(|o| o.kind() == Kind::ReplicatedStateMachine);
    let first = roots.next().ok_or_else(|| anyhow!("manifest has no ReplicatedStateMachine"))?;
    if roots.next().is_some() {
        return Err(anyhow!("manifest has more than one ReplicatedStateMachine"));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: workloads.orka.io/v1alpha1
kind: ReplicatedStateMachine
metadata:
  name: bar
spec:
  replicas: 7
  podManagementPolicy: OrderedReady
  instances:
    - name: hello
    - generateName: foo
      replicas: 2
---
apiVersion: v1
kind: Pod
metadata:
  name: foo-0
  namespace: default
---
"#;

    #[test]
    fn parses_workload_and_units() {
        let objs = parse(MANIFEST, &Scheme::builtin()).unwrap();
        assert_eq!(objs.len(), 2);
        let w = workload(&objs).unwrap().as_workload().unwrap();
        assert_eq!(w.spec.replicas, 7);
        assert_eq!(w.spec.instances.len(), 2);
        assert_eq!(w.namespace(), "default");
        assert_eq!(objs[1].kind(), Kind::Pod);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = parse("apiVersion: v1\nkind: Secret\nmetadata: {name: s}\n", &Scheme::builtin()).unwrap_err();
        assert!(format!("{err:#}").contains("Secret"));
    }

    #[test]
    fn workload_is_required() {
        let objs = parse("apiVersion: v1\nkind: Pod\nmetadata: {name: p}\n", &Scheme::builtin()).unwrap();
        assert!(workload(&objs).is_err());
    }
}
