//! Normalized view over raw cluster objects

use std::collections::BTreeSet;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde_json::Value;

use crate::error::{KhError, Result};

/// Object UID as reported by the API server.
pub type Uid = String;

/// Logical type name of a resource: API group plus kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Kind in the core (empty) API group.
    pub fn core(kind: impl Into<String>) -> Self {
        Self::new("", kind)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Full type identity of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }

    /// Parse from the `apiVersion` and `kind` fields of a manifest.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// A `(group, resource)` pair, as it appears in resource arguments and
/// related-object references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// Parse the `resource.group` argument form, e.g. `deployments.apps`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((resource, group)) => Self::new(group, resource),
            None => Self::new("", s),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// Namespace scope of a query or cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Cluster-scoped resources only.
    Cluster,
    /// Namespaced resources across all namespaces, plus cluster-scoped ones.
    All,
    /// Namespaced resources in a single namespace.
    Namespaced(String),
}

impl Scope {
    pub fn from_namespace(namespace: Option<&str>) -> Self {
        match namespace {
            Some(ns) => Scope::Namespaced(ns.to_string()),
            None => Scope::Cluster,
        }
    }

    /// The namespace to pass to a namespaced list call, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Namespaced(ns) => Some(ns),
            _ => None,
        }
    }
}

/// Declarative inclusion/exclusion predicate over kinds.
///
/// A kind matches when `included` is non-empty and contains it, or when
/// `included` is empty, `include_all` is set and the kind is not excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupKindMatcher {
    pub include_all: bool,
    pub included: BTreeSet<GroupKind>,
    pub excluded: BTreeSet<GroupKind>,
}

impl GroupKindMatcher {
    /// Matcher selecting everything.
    pub fn all() -> Self {
        Self {
            include_all: true,
            ..Default::default()
        }
    }

    /// Matcher selecting everything except the given kinds.
    pub fn all_except(excluded: impl IntoIterator<Item = GroupKind>) -> Self {
        Self {
            include_all: true,
            excluded: excluded.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Matcher selecting exactly the given kinds.
    pub fn kinds(included: impl IntoIterator<Item = GroupKind>) -> Self {
        Self {
            included: included.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn matches(&self, gk: &GroupKind) -> bool {
        if !self.included.is_empty() {
            return self.included.contains(gk);
        }
        self.include_all && !self.excluded.contains(gk)
    }

    /// Merge two matchers. The merge is monotonic: the result matches at
    /// least everything either input matched.
    pub fn merge(&self, other: &GroupKindMatcher) -> GroupKindMatcher {
        GroupKindMatcher {
            include_all: self.include_all || other.include_all,
            included: self.included.union(&other.included).cloned().collect(),
            excluded: self.excluded.union(&other.excluded).cloned().collect(),
        }
    }
}

/// A single cluster object: type identity, metadata and the raw payload.
///
/// Objects are immutable snapshots; analyzers reach resource-specific fields
/// through the raw document.
#[derive(Debug, Clone)]
pub struct Object {
    pub types: GroupVersionKind,
    pub meta: ObjectMeta,
    pub raw: Value,
}

impl Object {
    /// Build an object from a raw JSON document, as returned by the API
    /// server or decoded from a manifest.
    pub fn from_value(raw: Value) -> Result<Object> {
        let api_version = raw
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| KhError::Object("missing apiVersion".into()))?;
        let kind = raw
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| KhError::Object("missing kind".into()))?;
        let types = GroupVersionKind::from_api_version(api_version, kind);

        let meta_value = raw
            .get("metadata")
            .cloned()
            .ok_or_else(|| KhError::Object("missing metadata".into()))?;
        let meta: ObjectMeta = serde_json::from_value(meta_value)
            .map_err(|e| KhError::Object(format!("failed to read object metadata: {e}")))?;

        Ok(Object { types, meta, raw })
    }

    pub fn group_kind(&self) -> GroupKind {
        self.types.group_kind()
    }

    pub fn uid(&self) -> &str {
        self.meta.uid.as_deref().unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.meta.name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta.namespace.as_deref()
    }

    /// The cache scope this object belongs to.
    pub fn scope(&self) -> Scope {
        Scope::from_namespace(self.namespace())
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        self.meta.owner_references.as_deref().unwrap_or(&[])
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.meta
            .labels
            .iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Key identifying the object within one evaluation, even when the
    /// server-assigned UID is absent (e.g. objects read from a manifest).
    pub fn identity(&self) -> String {
        if !self.uid().is_empty() {
            return self.uid().to_string();
        }
        format!(
            "{}/{}/{}",
            self.group_kind(),
            self.namespace().unwrap_or(""),
            self.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gk(group: &str, kind: &str) -> GroupKind {
        GroupKind::new(group, kind)
    }

    #[test]
    fn test_group_kind_display() {
        assert_eq!(gk("", "Pod").to_string(), "Pod");
        assert_eq!(gk("apps", "Deployment").to_string(), "Deployment.apps");
    }

    #[test]
    fn test_group_resource_parse() {
        let gr = GroupResource::parse("deployments.apps");
        assert_eq!(gr.group, "apps");
        assert_eq!(gr.resource, "deployments");

        let gr = GroupResource::parse("pods");
        assert_eq!(gr.group, "");
        assert_eq!(gr.resource, "pods");
    }

    #[test]
    fn test_matcher_included_wins_over_excluded() {
        let m = GroupKindMatcher {
            include_all: false,
            included: [gk("", "Service")].into_iter().collect(),
            excluded: [gk("", "Service")].into_iter().collect(),
        };
        assert!(m.matches(&gk("", "Service")));
        assert!(!m.matches(&gk("", "Pod")));
    }

    #[test]
    fn test_matcher_include_all_respects_excluded() {
        let m = GroupKindMatcher::all_except([gk("", "Secret")]);
        assert!(m.matches(&gk("", "Pod")));
        assert!(!m.matches(&gk("", "Secret")));
    }

    #[test]
    fn test_matcher_empty_matches_nothing() {
        let m = GroupKindMatcher::default();
        assert!(!m.matches(&gk("", "Pod")));
    }

    #[test]
    fn test_matcher_merge_is_monotonic() {
        let a = GroupKindMatcher::kinds([gk("", "Pod")]);
        let b = GroupKindMatcher::all_except([gk("", "Secret")]);
        let merged = a.merge(&b);

        assert!(merged.matches(&gk("", "Pod")));
        assert!(merged.matches(&gk("apps", "Deployment")));
    }

    #[test]
    fn test_matcher_merge_commutative_associative_idempotent() {
        let a = GroupKindMatcher::kinds([gk("", "Pod"), gk("apps", "ReplicaSet")]);
        let b = GroupKindMatcher::all_except([gk("", "Secret")]);
        let c = GroupKindMatcher::kinds([gk("batch", "Job")]);

        assert_eq!(a.merge(&b), b.merge(&a));
        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn test_object_from_value() {
        let obj = Object::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "ReplicaSet",
            "metadata": {
                "name": "web-5d4",
                "namespace": "default",
                "uid": "rs-1",
                "labels": {"app": "web"},
            },
            "spec": {"replicas": 2},
        }))
        .unwrap();

        assert_eq!(obj.group_kind(), gk("apps", "ReplicaSet"));
        assert_eq!(obj.types.version, "v1");
        assert_eq!(obj.name(), "web-5d4");
        assert_eq!(obj.namespace(), Some("default"));
        assert_eq!(obj.uid(), "rs-1");
        assert_eq!(obj.raw.pointer("/spec/replicas"), Some(&json!(2)));
    }

    #[test]
    fn test_object_identity_without_uid() {
        let obj = Object::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p1", "namespace": "default"},
        }))
        .unwrap();
        assert_eq!(obj.identity(), "Pod/default/p1");
    }
}
