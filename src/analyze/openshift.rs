//! OpenShift ClusterOperator analyzer
//!
//! ClusterOperators report `Available`/`Degraded` conditions plus a list of
//! related objects that are logically part of their health. The related
//! objects are followed recursively, filtered through the ignored-kind set.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::analyze::aggregate_result;
use crate::analyze::conditions::{
    analyze_object_conditions, default_condition_analyzers, ConditionAnalyzer, ConditionMatcher,
    GenericConditionAnalyzer,
};
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, GroupResource, Object};
use crate::status::ObjectStatus;

fn gk_cluster_operator() -> GroupKind {
    GroupKind::new("config.openshift.io", "ClusterOperator")
}

fn cluster_operator_conditions() -> GenericConditionAnalyzer {
    GenericConditionAnalyzer {
        conditions: ConditionMatcher::exact(["Available"]),
        reversed_polarity: ConditionMatcher::exact(["Degraded"]),
        ..Default::default()
    }
}

/// The insights operator reports a handful of extra condition types with
/// their own polarity rules.
fn insights_conditions() -> GenericConditionAnalyzer {
    GenericConditionAnalyzer {
        reversed_polarity: ConditionMatcher::exact(["ClusterTransferAvailable"]),
        warning: ConditionMatcher::patterns(["RemoteConfiguration"]),
        progressing: ConditionMatcher::exact(["ClusterTransferAvailable"]),
        ..Default::default()
    }
}

pub struct ClusterOperatorAnalyzer;

#[async_trait]
impl ObjectAnalyzer for ClusterOperatorAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_cluster_operator()
    }

    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let mut chain: Vec<Arc<dyn ConditionAnalyzer>> = vec![Arc::new(cluster_operator_conditions())];
        if obj.name() == "insights" {
            chain.push(Arc::new(insights_conditions()));
        }
        chain.extend(default_condition_analyzers());

        let conditions = analyze_object_conditions(&obj, &chain);

        // cloud-controller-manager references itself in the related objects,
        // so this is to avoid an endless loop.
        if obj.name() == "cloud-controller-manager" {
            return aggregate_result(obj, Vec::new(), conditions);
        }

        let children = eval_related_objects(eval, &obj).await;
        aggregate_result(obj, children, conditions)
    }
}

async fn eval_related_objects(eval: &Evaluator, obj: &Arc<Object>) -> Vec<ObjectStatus> {
    let Some(Value::Array(related)) = obj.raw.pointer("/status/relatedObjects") else {
        return Vec::new();
    };

    let mut statuses = Vec::new();
    for rel in related {
        let field = |name: &str| rel.get(name).and_then(Value::as_str).unwrap_or("");
        let (group, resource, name) = (field("group"), field("resource"), field("name"));
        if resource.is_empty() || name.is_empty() {
            continue;
        }

        let gr = GroupResource::new(group, resource);
        let kind = match eval.resource_to_kind(&gr) {
            Ok(kind) => kind,
            Err(e) => {
                debug!(resource = %gr, error = %e, "skipping unmapped related object");
                continue;
            }
        };
        if eval.is_ignored(&kind) {
            continue;
        }
        // Skip self-references.
        if kind == obj.group_kind() && name == obj.name() {
            continue;
        }

        let namespace = Some(field("namespace")).filter(|ns| !ns.is_empty());
        match eval.eval_resource(&gr, namespace, name).await {
            Ok(children) => statuses.extend(children),
            Err(e) => {
                debug!(resource = %gr, name, error = %e, "failed to evaluate related object");
                continue;
            }
        }
    }
    statuses
}
