//! JSON merge patch (RFC 7386) between two versions of an object.

use orka_core::Object;
use serde_json::{Map, Value as Json};

/// Metadata fields owned by the API server; never part of a patch.
const SERVER_MANAGED: [&str; 6] = ["managedFields", "resourceVersion", "generation", "creationTimestamp", "uid", "deletionTimestamp"];

/// Merge patch turning `base` into `target`. Returns an empty object when equal.
pub fn diff(base: &Json, target: &Json) -> Json {
    match (base, target) {
        (Json::Object(bo), Json::Object(to)) => {
            let mut out = Map::new();
            for (k, tv) in to.iter() {
                match bo.get(k) {
                    Some(bv) if bv == tv => {}
                    Some(bv @ Json::Object(_)) if tv.is_object() => {
                        out.insert(k.clone(), diff(bv, tv));
                    }
                    _ => {
                        out.insert(k.clone(), tv.clone());
                    }
                }
            }
            for k in bo.keys() {
                if !to.contains_key(k) {
                    out.insert(k.clone(), Json::Null);
                }
            }
            Json::Object(out)
        }
        (_, t) => t.clone(),
    }
}

/// Apply a merge patch in place.
pub fn apply(doc: &mut Json, patch: &Json) {
    let Json::Object(pm) = patch else {
        *doc = patch.clone();
        return;
    };
    if !doc.is_object() {
        *doc = Json::Object(Map::new());
    }
    if let Json::Object(dm) = doc {
        for (k, pv) in pm.iter() {
            if pv.is_null() {
                dm.remove(k);
            } else {
                apply(dm.entry(k.clone()).or_insert(Json::Null), pv);
            }
        }
    }
}

pub fn is_empty(patch: &Json) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

fn strip_server_fields(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(Json::as_object_mut) {
        for f in SERVER_MANAGED {
            meta.remove(f);
        }
    }
    // Status is a subresource; it travels through status updates only.
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}

/// Merge patch for an object write, ignoring server-managed fields and status.
pub fn object_patch(base: &Object, target: &Object) -> serde_json::Result<Json> {
    let b = strip_server_fields(base.to_json()?);
    let t = strip_server_fields(target.to_json()?);
    Ok(diff(&b, &t))
}
