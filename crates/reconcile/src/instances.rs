//! Instance template resolution: which replica units a workload wants.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use orka_core::{InstanceTemplate, ReplicatedStateMachine};

use crate::error::ReconcileError;

/// One desired replica unit and the instance template that names it
/// (`None` for units filled from the common template).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredInstance {
    pub name: String,
    pub template: Option<InstanceTemplate>,
}

/// Split a unit name into `(group, ordinal)`. Names without a numeric
/// suffix form their own group at ordinal 0.
pub fn ordinal_key(name: &str) -> (&str, u64) {
    match name.rsplit_once('-') {
        Some((prefix, n)) if !prefix.is_empty() => match n.parse::<u64>() {
            Ok(ord) => (prefix, ord),
            Err(_) => (name, 0),
        },
        _ => (name, 0),
    }
}

/// Total order used for ordered rollout: by group, then ordinal, then name.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    ordinal_key(a).cmp(&ordinal_key(b)).then_with(|| a.cmp(b))
}

fn validate(t: &InstanceTemplate) -> Result<(), ReconcileError> {
    let invalid = |reason| Err(ReconcileError::InvalidTemplate { id: t.id().to_string(), reason });
    match (&t.name, &t.generate_name) {
        (Some(_), Some(_)) => return invalid("name and generateName are mutually exclusive"),
        (None, None) => return invalid("one of name or generateName is required"),
        (Some(n), None) if n.is_empty() => return invalid("name is empty"),
        (None, Some(p)) if p.is_empty() => return invalid("generateName is empty"),
        _ => {}
    }
    match t.replicas {
        Some(r) if r < 0 => invalid("replicas must not be negative"),
        Some(r) if r != 1 && t.name.is_some() => invalid("a named instance has exactly one replica"),
        _ => Ok(()),
    }
}

fn expand(t: &InstanceTemplate) -> Vec<String> {
    match (&t.name, &t.generate_name) {
        (Some(name), _) => vec![name.clone()],
        (None, Some(prefix)) => (0..t.replicas.unwrap_or(1)).map(|i| format!("{prefix}-{i}")).collect(),
        (None, None) => Vec::new(),
    }
}

/// Resolve the full desired unit set, sorted by [`compare_names`].
///
/// Named and generated templates claim their units first; the rest of
/// `spec.replicas` is filled from the common template as `<workload>-<i>`,
/// skipping ordinals already claimed.
pub fn resolve(w: &ReplicatedStateMachine) -> Result<Vec<DesiredInstance>, ReconcileError> {
    let total = w.spec.replicas;
    if total < 0 {
        return Err(ReconcileError::NegativeReplicas(total));
    }
    let mut requested = 0i64;
    for t in &w.spec.instances {
        validate(t)?;
        requested += i64::from(t.replicas.unwrap_or(1));
    }
    // Bound the request before any group is expanded.
    if requested > i64::from(total) {
        let claimed = usize::try_from(requested).unwrap_or(usize::MAX);
        return Err(ReconcileError::InsufficientReplicas { total, claimed });
    }

    let mut claimed = BTreeSet::new();
    let mut out = Vec::new();
    for t in &w.spec.instances {
        for name in expand(t) {
            if !claimed.insert(name.clone()) {
                return Err(ReconcileError::NameCollision(name));
            }
            out.push(DesiredInstance { name, template: Some(t.clone()) });
        }
    }
    let mut remaining = usize::try_from(total).unwrap_or(0).saturating_sub(out.len());
    let mut ordinal = 0u64;
    while remaining > 0 {
        let name = format!("{}-{}", w.name(), ordinal);
        ordinal += 1;
        if claimed.insert(name.clone()) {
            out.push(DesiredInstance { name, template: None });
            remaining -= 1;
        }
    }
    out.sort_by(|a, b| compare_names(&a.name, &b.name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(w: &ReplicatedStateMachine) -> Vec<String> {
        resolve(w).unwrap().into_iter().map(|d| d.name).collect()
    }

    fn scenario() -> ReplicatedStateMachine {
        ReplicatedStateMachine::new("default", "bar")
            .with_replicas(7)
            .with_instance(InstanceTemplate::named("hello"))
            .with_instance(InstanceTemplate::generated("foo", 2))
    }

    #[test]
    fn ordinal_key_splits_trailing_number() {
        assert_eq!(ordinal_key("bar-12"), ("bar", 12));
        assert_eq!(ordinal_key("my-db-0"), ("my-db", 0));
        assert_eq!(ordinal_key("hello"), ("hello", 0));
        assert_eq!(ordinal_key("web-x"), ("web-x", 0));
        assert_eq!(ordinal_key("-3"), ("-3", 0));
    }

    #[test]
    fn numeric_ordinals_sort_numerically() {
        let mut v = vec!["a-10", "a-2", "a-1", "b-0"];
        v.sort_by(|a, b| compare_names(a, b));
        assert_eq!(v, vec!["a-1", "a-2", "a-10", "b-0"]);
    }

    #[test]
    fn scenario_resolves_named_generated_and_common_units() {
        let w = scenario();
        assert_eq!(names(&w), vec!["bar-0", "bar-1", "bar-2", "bar-3", "foo-0", "foo-1", "hello"]);
        let resolved = resolve(&w).unwrap();
        let foo = resolved.iter().find(|d| d.name == "foo-1").unwrap();
        assert_eq!(foo.template.as_ref().unwrap().id(), "foo");
        assert!(resolved.iter().find(|d| d.name == "bar-0").unwrap().template.is_none());
    }

    #[test]
    fn common_template_skips_claimed_names() {
        let w = ReplicatedStateMachine::new("default", "web").with_replicas(3).with_instance(InstanceTemplate::named("web-0"));
        assert_eq!(names(&w), vec!["web-0", "web-1", "web-2"]);
        let resolved = resolve(&w).unwrap();
        assert!(resolved[0].template.is_some());
        assert!(resolved[1].template.is_none());
    }

    #[test]
    fn zero_replicas_want_nothing() {
        assert!(names(&ReplicatedStateMachine::new("default", "web").with_replicas(0)).is_empty());
    }

    #[test]
    fn resolved_size_matches_total() {
        for total in 3..10 {
            let w = scenario().with_replicas(total);
            let got = names(&w);
            let unique: BTreeSet<_> = got.iter().collect();
            assert_eq!(got.len(), total as usize);
            assert_eq!(unique.len(), got.len());
        }
    }

    #[test]
    fn configuration_errors() {
        let w = scenario().with_instance(InstanceTemplate::generated("foo", 1));
        assert!(matches!(resolve(&w), Err(ReconcileError::NameCollision(n)) if n == "foo-0"));

        let w = scenario().with_replicas(2);
        assert!(matches!(resolve(&w), Err(ReconcileError::InsufficientReplicas { total: 2, claimed: 3 })));

        let w = scenario().with_replicas(-1);
        assert!(matches!(resolve(&w), Err(ReconcileError::NegativeReplicas(-1))));

        let both = InstanceTemplate { name: Some("a".into()), generate_name: Some("b".into()), ..Default::default() };
        let w = ReplicatedStateMachine::new("default", "web").with_replicas(3).with_instance(both);
        assert!(matches!(resolve(&w), Err(ReconcileError::InvalidTemplate { .. })));

        let w = ReplicatedStateMachine::new("default", "web").with_instance(InstanceTemplate::default());
        assert!(matches!(resolve(&w), Err(ReconcileError::InvalidTemplate { .. })));

        let mut named = InstanceTemplate::named("a");
        named.replicas = Some(2);
        let w = ReplicatedStateMachine::new("default", "web").with_replicas(3).with_instance(named);
        assert!(matches!(resolve(&w), Err(ReconcileError::InvalidTemplate { .. })));

        let w = ReplicatedStateMachine::new("default", "web").with_instance(InstanceTemplate::generated("g", -1));
        let err = resolve(&w).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn oversized_group_is_rejected_up_front() {
        let w = ReplicatedStateMachine::new("default", "web")
            .with_replicas(1)
            .with_instance(InstanceTemplate::generated("g", 20_000_000));
        let err = resolve(&w).unwrap_err();
        assert!(matches!(err, ReconcileError::InsufficientReplicas { total: 1, claimed: 20_000_000 }));
        assert!(err.is_config());
    }

    #[test]
    fn group_sum_beyond_i32_is_rejected() {
        let w = ReplicatedStateMachine::new("default", "web")
            .with_replicas(i32::MAX)
            .with_instance(InstanceTemplate::generated("a", i32::MAX))
            .with_instance(InstanceTemplate::generated("b", i32::MAX));
        assert!(matches!(resolve(&w), Err(ReconcileError::InsufficientReplicas { total: i32::MAX, .. })));
    }

    #[test]
    fn groups_filling_the_total_exactly_resolve() {
        let w = ReplicatedStateMachine::new("default", "web")
            .with_replicas(3)
            .with_instance(InstanceTemplate::generated("g", 2))
            .with_instance(InstanceTemplate::named("solo"));
        assert_eq!(names(&w), vec!["g-0", "g-1", "solo"]);
    }
}
