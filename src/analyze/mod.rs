//! Analyzers: per-kind strategies computing an object's status tree

pub mod conditions;

mod job;
mod olm;
mod openshift;
mod pod;
mod pvc;
mod service;
mod workload;

pub use job::JobAnalyzer;
pub use olm::{OlmCsvAnalyzer, OlmSubscriptionAnalyzer};
pub use openshift::ClusterOperatorAnalyzer;
pub use pod::PodAnalyzer;
pub use pvc::PvcAnalyzer;
pub use service::ServiceAnalyzer;
pub use workload::{DeploymentAnalyzer, ReplicaSetAnalyzer};

use std::sync::Arc;

use async_trait::async_trait;

use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, Object};
use crate::status::{ConditionStatus, ObjectStatus, Status, Verdict};

use conditions::{analyze_object_conditions, default_condition_analyzers};

/// Combine child statuses and condition analyses into the object's verdict.
///
/// The worst result dominates; Unknown is "no evidence", not "bad", so it
/// never overrides actual evidence. Progressing propagates upward. Errors
/// observed during evaluation are carried for diagnostics but don't promote
/// the verdict; only the resource's own conditions do.
pub fn aggregate_result(
    object: Arc<Object>,
    children: Vec<ObjectStatus>,
    conditions: Vec<ConditionStatus>,
) -> ObjectStatus {
    if children.is_empty() && conditions.is_empty() {
        return ObjectStatus::unknown(object);
    }

    let mut result = Verdict::Unknown;
    let mut progressing = false;
    let mut error: Option<String> = None;

    let signals = conditions
        .iter()
        .map(|c| &c.status)
        .chain(children.iter().map(|c| &c.status));
    for status in signals {
        result = result.max(status.result);
        progressing |= status.progressing;
        if error.is_none() {
            error = status.error.clone();
        }
    }

    let message = if progressing {
        "Progressing".to_string()
    } else {
        result.as_str().to_string()
    };

    ObjectStatus {
        object,
        status: Status {
            result,
            progressing,
            message,
            error,
        },
        conditions,
        children,
    }
}

/// Fallback analyzer for kinds without a specific one: read the object's
/// conditions, apply the default condition analyzers, aggregate with no
/// children.
pub struct DefaultAnalyzer;

#[async_trait]
impl ObjectAnalyzer for DefaultAnalyzer {
    fn supports(&self, _obj: &Object) -> bool {
        true
    }

    async fn analyze(&self, _eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let conditions = analyze_object_conditions(&obj, &default_condition_analyzers());
        aggregate_result(obj, Vec::new(), conditions)
    }
}

/// Analyzer for kinds that are healthy by their mere existence.
pub struct AlwaysGreenAnalyzer {
    pub kinds: Vec<GroupKind>,
}

#[async_trait]
impl ObjectAnalyzer for AlwaysGreenAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        self.kinds.contains(&obj.group_kind())
    }

    async fn analyze(&self, _eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        ObjectStatus::ok(obj, Vec::new())
    }
}

/// Kind to analyzer lookup plus the set of kinds never evaluated or
/// traversed. Built once at program start and handed to the evaluator.
pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn ObjectAnalyzer>>,
    ignored: Vec<GroupKind>,
}

impl AnalyzerRegistry {
    pub fn builder() -> AnalyzerRegistryBuilder {
        AnalyzerRegistryBuilder {
            analyzers: Vec::new(),
            ignored: Vec::new(),
        }
    }

    pub fn into_parts(self) -> (Vec<Box<dyn ObjectAnalyzer>>, Vec<GroupKind>) {
        (self.analyzers, self.ignored)
    }
}

pub struct AnalyzerRegistryBuilder {
    analyzers: Vec<Box<dyn ObjectAnalyzer>>,
    ignored: Vec<GroupKind>,
}

impl AnalyzerRegistryBuilder {
    /// Register an analyzer. Dispatch order follows registration order; the
    /// first analyzer whose `supports` returns true wins.
    pub fn register(mut self, analyzer: impl ObjectAnalyzer + 'static) -> Self {
        self.analyzers.push(Box::new(analyzer));
        self
    }

    pub fn ignore_kinds(mut self, kinds: impl IntoIterator<Item = GroupKind>) -> Self {
        for kind in kinds {
            if !self.ignored.contains(&kind) {
                self.ignored.push(kind);
            }
        }
        self
    }

    pub fn build(self) -> AnalyzerRegistry {
        AnalyzerRegistry {
            analyzers: self.analyzers,
            ignored: self.ignored,
        }
    }
}

/// Kinds that are not interesting for status evaluation and are never
/// followed through references.
fn base_ignored_kinds() -> Vec<GroupKind> {
    vec![
        GroupKind::core("ConfigMap"),
        GroupKind::core("ServiceAccount"),
        GroupKind::new("rbac.authorization.k8s.io", "Role"),
        GroupKind::new("rbac.authorization.k8s.io", "RoleBinding"),
        GroupKind::core("Secret"),
        GroupKind::new("discovery.k8s.io", "EndpointSlice"),
        GroupKind::core("Service"),
        GroupKind::new("apps", "ControllerRevision"),
        GroupKind::new("kubehealth.io", "Log"),
    ]
}

/// Extra kinds ignored when traversing OpenShift operator references.
fn openshift_ignored_kinds() -> Vec<GroupKind> {
    vec![
        GroupKind::core("Namespace"),
        GroupKind::new("rbac.authorization.k8s.io", "ClusterRole"),
        GroupKind::new("rbac.authorization.k8s.io", "ClusterRoleBinding"),
        GroupKind::new("apiextensions.k8s.io", "CustomResourceDefinition"),
        GroupKind::new("security.openshift.io", "SecurityContextConstraints"),
        GroupKind::new("admissionregistration.k8s.io", "MutatingWebhookConfiguration"),
        GroupKind::new("admissionregistration.k8s.io", "ValidatingWebhookConfiguration"),
        GroupKind::new("config.openshift.io", "OAuth"),
        GroupKind::new("config.openshift.io", "Node"),
        GroupKind::new("operator.openshift.io", "CloudCredential"),
        GroupKind::new("console.openshift.io", "ConsolePlugin"),
        GroupKind::new("machineconfiguration.openshift.io", "MachineConfig"),
        GroupKind::new("template.openshift.io", "Template"),
        GroupKind::new("monitoring.coreos.com", "ServiceMonitor"),
        GroupKind::new("monitoring.coreos.com", "PrometheusRule"),
    ]
}

/// The registry with all built-in analyzers, including the ecosystem
/// plug-ins. Extending it is a registration call on the builder.
pub fn default_registry() -> AnalyzerRegistry {
    AnalyzerRegistry::builder()
        .register(PodAnalyzer)
        .register(ReplicaSetAnalyzer)
        .register(DeploymentAnalyzer)
        .register(PvcAnalyzer)
        .register(ServiceAnalyzer)
        .register(JobAnalyzer)
        .register(ClusterOperatorAnalyzer)
        .register(OlmSubscriptionAnalyzer)
        .register(AlwaysGreenAnalyzer {
            kinds: vec![GroupKind::new("operators.coreos.com", "OperatorGroup")],
        })
        .ignore_kinds(base_ignored_kinds())
        .ignore_kinds(openshift_ignored_kinds())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Condition;
    use super::conditions::{condition_status_ok, condition_status_progressing, synthetic_error};
    use serde_json::json;

    fn test_object() -> Arc<Object> {
        Arc::new(
            Object::from_value(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "p1", "namespace": "default", "uid": "u1"},
            }))
            .unwrap(),
        )
    }

    fn cond(type_: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: "True".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregate_empty_is_unknown() {
        let os = aggregate_result(test_object(), Vec::new(), Vec::new());
        assert_eq!(os.status.result, Verdict::Unknown);
        assert!(!os.status.progressing);
    }

    #[test]
    fn test_aggregate_worst_result_dominates() {
        let conditions = vec![
            condition_status_ok(cond("Ready")),
            synthetic_error("ReplicasReady", "NotReady", "Ready: 0/2"),
        ];
        let os = aggregate_result(test_object(), Vec::new(), conditions);
        assert_eq!(os.status.result, Verdict::Error);
    }

    #[test]
    fn test_aggregate_unknown_does_not_clobber_evidence() {
        let conditions = vec![
            condition_status_ok(cond("Ready")),
            conditions::condition_status_unknown(cond("Whatever")),
        ];
        let os = aggregate_result(test_object(), Vec::new(), conditions);
        assert_eq!(os.status.result, Verdict::Ok);
    }

    #[test]
    fn test_aggregate_progressing_propagates_from_children() {
        let child = aggregate_result(
            test_object(),
            Vec::new(),
            vec![condition_status_progressing(cond("Progressing"))],
        );
        let os = aggregate_result(test_object(), vec![child], vec![condition_status_ok(cond("Ready"))]);
        assert_eq!(os.status.result, Verdict::Ok);
        assert!(os.status.progressing);
        assert_eq!(os.status.message, "Progressing");
    }

    #[test]
    fn test_aggregate_error_is_attached_not_promoted() {
        let conditions = vec![
            condition_status_ok(cond("Ready")),
            conditions::condition_status_unknown_with_error(cond("Other"), "boom"),
        ];
        let os = aggregate_result(test_object(), Vec::new(), conditions);
        assert_eq!(os.status.result, Verdict::Ok);
        assert_eq!(os.status.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_registry_builder_dedups_ignored_kinds() {
        let registry = AnalyzerRegistry::builder()
            .ignore_kinds([GroupKind::core("Secret"), GroupKind::core("Secret")])
            .build();
        let (_, ignored) = registry.into_parts();
        assert_eq!(ignored.len(), 1);
    }
}
