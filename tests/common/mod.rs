// Common test utilities: a fixture-backed fake cluster and assertion helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kubehealth::analyze::default_registry;
use kubehealth::cli::read_manifest;
use kubehealth::client::{ClusterClient, ListOutcome};
use kubehealth::error::{KhError, Result};
use kubehealth::eval::Evaluator;
use kubehealth::object::{GroupKind, GroupKindMatcher, GroupResource, Object, Scope};
use kubehealth::status::ConditionStatus;

struct FakeResource {
    kind: GroupKind,
    plural: &'static str,
    namespaced: bool,
}

/// In-memory stand-in for discovery plus the dynamic client, preloaded with
/// fixture objects.
pub struct FakeCluster {
    resources: Vec<FakeResource>,
    objects: Vec<Object>,
    logs: Mutex<HashMap<(String, String, String), String>>,
    /// Number of per-resource list calls issued.
    pub list_calls: AtomicUsize,
    /// Number of single-object fetches issued.
    pub get_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        let resource = |group: &str, kind: &str, plural: &'static str, namespaced: bool| {
            FakeResource {
                kind: GroupKind::new(group, kind),
                plural,
                namespaced,
            }
        };

        FakeCluster {
            resources: vec![
                resource("", "Pod", "pods", true),
                resource("", "Service", "services", true),
                resource("", "PersistentVolumeClaim", "persistentvolumeclaims", true),
                resource("", "ConfigMap", "configmaps", true),
                resource("", "Namespace", "namespaces", false),
                resource("apps", "ReplicaSet", "replicasets", true),
                resource("apps", "Deployment", "deployments", true),
                resource("batch", "Job", "jobs", true),
                resource("config.openshift.io", "ClusterOperator", "clusteroperators", false),
                resource("operators.coreos.com", "Subscription", "subscriptions", true),
                resource("operators.coreos.com", "InstallPlan", "installplans", true),
                resource(
                    "operators.coreos.com",
                    "ClusterServiceVersion",
                    "clusterserviceversions",
                    true,
                ),
                resource("operators.coreos.com", "OperatorGroup", "operatorgroups", true),
            ],
            objects: Vec::new(),
            logs: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Load a multi-document YAML fixture from `tests/fixtures/` and return
    /// the parsed objects in document order.
    pub fn add_fixture_file(&mut self, name: &str) -> Vec<Object> {
        let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {path}: {e}"));
        let objects = read_manifest(content.as_bytes())
            .unwrap_or_else(|e| panic!("failed to parse fixture {path}: {e}"));
        self.objects.extend(objects.iter().cloned());
        objects
    }

    pub fn register_pod_logs(&self, namespace: &str, pod: &str, container: &str, logs: &str) {
        self.logs.lock().unwrap().insert(
            (namespace.to_string(), pod.to_string(), container.to_string()),
            logs.to_string(),
        );
    }

    fn in_scope(scope: &Scope, obj: &Object) -> bool {
        match scope {
            Scope::All => true,
            Scope::Cluster => obj.namespace().is_none(),
            Scope::Namespaced(ns) => obj.namespace() == Some(ns.as_str()),
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_with_matcher(
        &self,
        scope: &Scope,
        matcher: &GroupKindMatcher,
        excluded: &[GroupKind],
    ) -> ListOutcome {
        let keep = |r: &&FakeResource| matcher.matches(&r.kind) && !excluded.contains(&r.kind);

        let mut kinds: Vec<GroupKind> = Vec::new();
        if matches!(scope, Scope::Cluster | Scope::All) {
            kinds.extend(
                self.resources
                    .iter()
                    .filter(|r| !r.namespaced)
                    .filter(keep)
                    .map(|r| r.kind.clone()),
            );
        }
        if matches!(scope, Scope::Namespaced(_) | Scope::All) {
            kinds.extend(
                self.resources
                    .iter()
                    .filter(|r| r.namespaced)
                    .filter(keep)
                    .map(|r| r.kind.clone()),
            );
        }

        self.list_calls.fetch_add(kinds.len(), Ordering::SeqCst);

        let objects = self
            .objects
            .iter()
            .filter(|o| kinds.contains(&o.group_kind()) && Self::in_scope(scope, o))
            .cloned()
            .collect();

        ListOutcome {
            objects,
            error: None,
        }
    }

    async fn get(&self, kind: &GroupKind, namespace: Option<&str>, name: &str) -> Result<Object> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .iter()
            .find(|o| &o.group_kind() == kind && o.namespace() == namespace && o.name() == name)
            .cloned()
            .ok_or_else(|| KhError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        _tail_lines: i64,
    ) -> Result<String> {
        let key = (
            namespace.to_string(),
            name.to_string(),
            container.to_string(),
        );
        self.logs
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| KhError::Object(format!("no logs for {namespace}/{name}/{container}")))
    }

    fn resource_to_kind(&self, resource: &GroupResource) -> Result<GroupKind> {
        self.resources
            .iter()
            .find(|r| {
                r.kind.group == resource.group
                    && (r.plural == resource.resource
                        || r.kind.kind.eq_ignore_ascii_case(&resource.resource))
            })
            .map(|r| r.kind.clone())
            .ok_or_else(|| KhError::UnknownResource(resource.to_string()))
    }

    fn is_namespaced(&self, kind: &GroupKind) -> Result<bool> {
        self.resources
            .iter()
            .find(|r| &r.kind == kind)
            .map(|r| r.namespaced)
            .ok_or_else(|| KhError::UnknownResource(kind.to_string()))
    }
}

/// Build an evaluator over a fake cluster preloaded with the given fixture
/// files, returning the parsed fixture objects in document order.
pub fn test_evaluator(fixtures: &[&str]) -> (Arc<Evaluator>, Arc<FakeCluster>, Vec<Arc<Object>>) {
    let mut cluster = FakeCluster::new();
    let mut roots = Vec::new();
    for name in fixtures {
        roots.extend(cluster.add_fixture_file(name).into_iter().map(Arc::new));
    }

    let cluster = Arc::new(cluster);
    let evaluator = Arc::new(Evaluator::new(
        Arc::clone(&cluster) as Arc<dyn ClusterClient>,
        default_registry(),
    ));
    (evaluator, cluster, roots)
}

/// Assert the rendered `TYPE REASON MESSAGE (RESULT)` lines of the
/// conditions match the expectation, ignoring surrounding whitespace.
pub fn assert_conditions(expected: &str, conditions: &[ConditionStatus]) {
    let rendered = conditions
        .iter()
        .map(|c| {
            format!(
                "{} {} {} ({})",
                c.condition.type_, c.condition.reason, c.condition.message, c.status.result
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let normalize = |s: &str| {
        s.trim()
            .split('\n')
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
    };

    assert_eq!(normalize(&rendered), normalize(expected));
}
