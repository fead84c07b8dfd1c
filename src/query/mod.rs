//! Declarative object queries resolved against the loader cache

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::loader::Loader;
use crate::object::{GroupKind, GroupKindMatcher, Object, Scope};

/// A declarative request for a set of objects.
///
/// Every query exposes the scope and matcher the loader needs to populate
/// its cache before the query itself filters the population.
#[derive(Clone)]
pub enum Query {
    /// All objects of matching kinds within the scope.
    Kind {
        scope: Scope,
        matcher: GroupKindMatcher,
    },
    /// Child objects whose labels satisfy the owner's label selector, in the
    /// owner's namespace.
    Selector {
        owner: Arc<Object>,
        child_kind: GroupKind,
    },
    /// Child objects whose owner references contain the owner's UID.
    Owner {
        owner: Arc<Object>,
        matcher: GroupKindMatcher,
    },
    /// Exactly one object identified by kind, namespace and name.
    Ref {
        kind: GroupKind,
        namespace: Option<String>,
        name: String,
    },
}

impl Query {
    pub fn scope(&self) -> Scope {
        match self {
            Query::Kind { scope, .. } => scope.clone(),
            Query::Selector { owner, .. } | Query::Owner { owner, .. } => owner.scope(),
            Query::Ref { namespace, .. } => Scope::from_namespace(namespace.as_deref()),
        }
    }

    pub fn matcher(&self) -> GroupKindMatcher {
        match self {
            Query::Kind { matcher, .. } | Query::Owner { matcher, .. } => matcher.clone(),
            Query::Selector { child_kind, .. } => GroupKindMatcher::kinds([child_kind.clone()]),
            Query::Ref { kind, .. } => GroupKindMatcher::kinds([kind.clone()]),
        }
    }

    /// Filter the loader's cached population down to the query's result.
    /// Runs after the loader preloaded the cache for `scope`/`matcher`.
    pub(crate) fn eval(&self, loader: &mut Loader) -> Vec<Arc<Object>> {
        match self {
            Query::Kind { scope, matcher } => loader.filter(scope, matcher),
            Query::Selector { owner, .. } => {
                let selector = selector_labels(owner);
                if selector.is_empty() {
                    return Vec::new();
                }
                loader
                    .filter(&self.scope(), &self.matcher())
                    .into_iter()
                    .filter(|obj| labels_match(obj, &selector))
                    .collect()
            }
            Query::Owner { owner, .. } => {
                let candidates = loader.filter(&self.scope(), &self.matcher());
                loader.filter_owned_by(owner.uid(), candidates)
            }
            Query::Ref { name, .. } => loader
                .filter(&self.scope(), &self.matcher())
                .into_iter()
                .filter(|obj| obj.name() == name)
                .collect(),
        }
    }
}

/// Read the owner's label selector: `spec.selector.matchLabels` for
/// workloads, plain `spec.selector` for services.
pub fn selector_labels(owner: &Object) -> BTreeMap<String, String> {
    let selector = owner
        .raw
        .pointer("/spec/selector/matchLabels")
        .or_else(|| owner.raw.pointer("/spec/selector"));

    let Some(Value::Object(map)) = selector else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

fn labels_match(obj: &Object, selector: &BTreeMap<String, String>) -> bool {
    let labels: BTreeMap<&str, &str> = obj.labels().collect();
    selector
        .iter()
        .all(|(k, v)| labels.get(k.as_str()) == Some(&v.as_str()))
}
