//! ReplicaSet and Deployment analyzers

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::analyze::aggregate_result;
use crate::analyze::conditions::{synthetic_error, synthetic_ok};
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, GroupKindMatcher, Object};
use crate::query::Query;
use crate::status::{ConditionStatus, ObjectStatus};

fn desired_replicas(obj: &Object) -> i64 {
    obj.raw
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .unwrap_or(1)
}

fn status_count(obj: &Object, field: &str) -> i64 {
    obj.raw
        .pointer(&format!("/status/{field}"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Synthesize an `n/m` replica-count comparison condition.
fn replica_condition(
    cond_type: &str,
    bad_reason: &str,
    label: &str,
    actual: i64,
    desired: i64,
) -> ConditionStatus {
    let message = format!("{label}: {actual}/{desired}");
    if actual >= desired {
        synthetic_ok(cond_type, &message)
    } else {
        synthetic_error(cond_type, bad_reason, &message)
    }
}

pub struct ReplicaSetAnalyzer;

#[async_trait]
impl ObjectAnalyzer for ReplicaSetAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == GroupKind::new("apps", "ReplicaSet")
    }

    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let desired = desired_replicas(&obj);
        let conditions = vec![
            replica_condition(
                "ReplicasLabeled",
                "Unlabeled",
                "Labeled",
                status_count(&obj, "fullyLabeledReplicas"),
                desired,
            ),
            replica_condition(
                "ReplicasAvailable",
                "Unavailable",
                "Available",
                status_count(&obj, "availableReplicas"),
                desired,
            ),
            replica_condition(
                "ReplicasReady",
                "NotReady",
                "Ready",
                status_count(&obj, "readyReplicas"),
                desired,
            ),
        ];

        let query = Query::Selector {
            owner: Arc::clone(&obj),
            child_kind: GroupKind::core("Pod"),
        };
        let children = match eval.eval_query(&query, None).await {
            Ok(children) => children,
            Err(e) => return ObjectStatus::unknown_with_error(obj, &e),
        };

        aggregate_result(obj, children, conditions)
    }
}

pub struct DeploymentAnalyzer;

#[async_trait]
impl ObjectAnalyzer for DeploymentAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == GroupKind::new("apps", "Deployment")
    }

    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let desired = desired_replicas(&obj);
        let conditions = vec![
            replica_condition(
                "ReplicasUpdated",
                "OutOfDate",
                "Updated",
                status_count(&obj, "updatedReplicas"),
                desired,
            ),
            replica_condition(
                "ReplicasAvailable",
                "Unavailable",
                "Available",
                status_count(&obj, "availableReplicas"),
                desired,
            ),
            replica_condition(
                "ReplicasReady",
                "NotReady",
                "Ready",
                status_count(&obj, "readyReplicas"),
                desired,
            ),
        ];

        // The deployment's pods hang off its replicasets.
        let query = Query::Owner {
            owner: Arc::clone(&obj),
            matcher: GroupKindMatcher::kinds([GroupKind::new("apps", "ReplicaSet")]),
        };
        let children = match eval.eval_query(&query, None).await {
            Ok(children) => children,
            Err(e) => return ObjectStatus::unknown_with_error(obj, &e),
        };

        aggregate_result(obj, children, conditions)
    }
}
