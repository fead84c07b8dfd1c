//! Pod analyzer

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};

use crate::analyze::aggregate_result;
use crate::analyze::conditions::{
    analyze_object_conditions, condition_status_error, default_condition_analyzers,
    synthetic_condition,
};
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, GroupVersionKind, Object};
use crate::status::{ConditionStatus, ObjectStatus, Verdict};

/// Number of log lines attached for containers stuck in a failure state.
const LOG_TAIL_LINES: i64 = 10;

pub struct PodAnalyzer;

#[async_trait]
impl ObjectAnalyzer for PodAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == GroupKind::core("Pod")
    }

    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let phase = obj
            .raw
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or("");

        // Completed workload pods report Ready=False without being failures.
        if phase == "Succeeded" {
            return ObjectStatus::ok(obj, Vec::new());
        }

        let conditions = analyze_object_conditions(&obj, &default_condition_analyzers());

        let mut children = Vec::new();
        if !pod_ready(&conditions) {
            for container in problem_containers(&obj) {
                children.push(log_substatus(eval, &obj, &container).await);
            }
        }

        aggregate_result(obj, children, conditions)
    }
}

fn pod_ready(conditions: &[ConditionStatus]) -> bool {
    conditions
        .iter()
        .any(|c| c.condition.type_ == "Ready" && c.status.result == Verdict::Ok)
}

/// Containers worth pulling logs for: not ready and either crash-looping or
/// recently terminated.
fn problem_containers(obj: &Object) -> Vec<String> {
    let Some(Value::Array(statuses)) = obj.raw.pointer("/status/containerStatuses") else {
        return Vec::new();
    };

    statuses
        .iter()
        .filter(|cs| !cs.get("ready").and_then(Value::as_bool).unwrap_or(false))
        .filter(|cs| {
            let waiting_reason = cs
                .pointer("/state/waiting/reason")
                .and_then(Value::as_str)
                .unwrap_or("");
            waiting_reason == "CrashLoopBackOff"
                || cs.pointer("/lastState/terminated").is_some()
        })
        .filter_map(|cs| cs.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Attach the container's recent log lines as a synthetic sub-object. The
/// fetch is best-effort; a failure degrades the sub-status to Unknown.
async fn log_substatus(eval: &Evaluator, pod: &Arc<Object>, container: &str) -> ObjectStatus {
    let log_obj = Arc::new(log_object(pod, container));

    let namespace = pod.namespace().unwrap_or("");
    match eval
        .pod_logs(namespace, pod.name(), container, LOG_TAIL_LINES)
        .await
    {
        Ok(logs) => {
            let cond = condition_status_error(synthetic_condition(
                "Ready",
                false,
                "NotReady",
                &format!("Logs:\n{logs}"),
            ));
            aggregate_result(log_obj, Vec::new(), vec![cond])
        }
        Err(e) => ObjectStatus::unknown_with_error(log_obj, &e),
    }
}

/// Fabricated object carrying a container's log excerpt in the status tree.
fn log_object(pod: &Object, container: &str) -> Object {
    Object {
        types: GroupVersionKind {
            group: "kubehealth.io".to_string(),
            version: "v1".to_string(),
            kind: "Log".to_string(),
        },
        meta: ObjectMeta {
            name: Some(container.to_string()),
            namespace: pod.namespace().map(str::to_string),
            ..Default::default()
        },
        raw: json!({
            "apiVersion": "kubehealth.io/v1",
            "kind": "Log",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_containers() {
        let pod = Object::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p2", "namespace": "default", "uid": "u2"},
            "status": {
                "containerStatuses": [
                    {"name": "healthy", "ready": true, "state": {"running": {}}},
                    {"name": "crashing", "ready": false,
                     "state": {"waiting": {"reason": "CrashLoopBackOff"}}},
                    {"name": "terminated", "ready": false,
                     "state": {"waiting": {"reason": "ContainerCreating"}},
                     "lastState": {"terminated": {"exitCode": 1, "reason": "Error"}}},
                    {"name": "starting", "ready": false,
                     "state": {"waiting": {"reason": "ContainerCreating"}}},
                ],
            },
        }))
        .unwrap();

        assert_eq!(problem_containers(&pod), vec!["crashing", "terminated"]);
    }

    #[test]
    fn test_log_object_identity() {
        let pod = Object::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p2", "namespace": "default", "uid": "u2"},
        }))
        .unwrap();

        let log = log_object(&pod, "p2c");
        assert_eq!(log.group_kind(), GroupKind::new("kubehealth.io", "Log"));
        assert_eq!(log.name(), "p2c");
        assert_eq!(log.namespace(), Some("default"));
    }
}
