//! Analyzers for resources managed by Operator Lifecycle Manager (OLM)
//! (https://olm.operatorframework.io/). This is not a third-party operator,
//! but it demonstrates how to extend kubehealth with custom analyzers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::analyze::aggregate_result;
use crate::analyze::conditions::{
    analyze_conditions, analyze_object_conditions, condition_status_error,
    default_condition_analyzers, synthetic_progressing, ConditionAnalyzer, ConditionMatcher,
    GenericConditionAnalyzer,
};
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, GroupVersionKind, Object};
use crate::query::Query;
use crate::status::{Condition, ObjectStatus};

const OLM_GROUP: &str = "operators.coreos.com";

fn gk_subscription() -> GroupKind {
    GroupKind::new(OLM_GROUP, "Subscription")
}

fn gk_csv() -> GroupKind {
    GroupKind::new(OLM_GROUP, "ClusterServiceVersion")
}

fn subscription_conditions() -> GenericConditionAnalyzer {
    GenericConditionAnalyzer {
        reversed_polarity: ConditionMatcher::exact(["CatalogSourcesUnhealthy", "ResolutionFailed"]),
        ..Default::default()
    }
}

pub struct OlmSubscriptionAnalyzer;

#[async_trait]
impl ObjectAnalyzer for OlmSubscriptionAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_subscription()
    }

    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let install_plans = analyze_install_plans(eval, &obj).await;
        let csvs = analyze_csv(eval, &obj).await;

        let mut chain: Vec<Arc<dyn ConditionAnalyzer>> = vec![Arc::new(subscription_conditions())];
        chain.extend(default_condition_analyzers());
        let mut conditions = analyze_object_conditions(&obj, &chain);

        if install_plans.is_empty() {
            conditions.push(synthetic_progressing(
                "InstallPlan",
                "InstallPlanMissing",
                "Install plan not found",
            ));
        }

        let mut children = install_plans;
        children.extend(csvs);

        aggregate_result(obj, children, conditions)
    }
}

/// Follow `status.installPlanRef` to the subscription's install plan.
async fn analyze_install_plans(eval: &Evaluator, obj: &Arc<Object>) -> Vec<ObjectStatus> {
    let Some(ref_data) = obj.raw.pointer("/status/installPlanRef") else {
        return Vec::new();
    };

    let field = |name: &str| ref_data.get(name).and_then(Value::as_str).unwrap_or("");
    let (api_version, kind, name) = (field("apiVersion"), field("kind"), field("name"));
    if kind.is_empty() || name.is_empty() {
        debug!(object = obj.name(), "incomplete install plan reference");
        return Vec::new();
    }

    let ref_namespace = Some(field("namespace"))
        .filter(|ns| !ns.is_empty())
        .or_else(|| obj.namespace());
    let query = Query::Ref {
        kind: GroupVersionKind::from_api_version(api_version, kind).group_kind(),
        namespace: ref_namespace.map(str::to_string),
        name: name.to_string(),
    };

    match eval.eval_query(&query, None).await {
        Ok(statuses) => statuses,
        Err(e) => {
            debug!(object = obj.name(), error = %e, "failed to evaluate install plan");
            Vec::new()
        }
    }
}

/// Follow `status.currentCSV` to the cluster service version, analyzed with
/// its own analyzer.
async fn analyze_csv(eval: &Evaluator, obj: &Arc<Object>) -> Vec<ObjectStatus> {
    let Some(csv_name) = obj.raw.pointer("/status/currentCSV").and_then(Value::as_str) else {
        return Vec::new();
    };

    let query = Query::Ref {
        kind: gk_csv(),
        namespace: obj.namespace().map(str::to_string),
        name: csv_name.to_string(),
    };

    match eval.eval_query(&query, Some(&OlmCsvAnalyzer)).await {
        Ok(statuses) => statuses,
        Err(e) => {
            debug!(object = obj.name(), error = %e, "failed to evaluate csv status");
            Vec::new()
        }
    }
}

pub struct OlmCsvAnalyzer;

#[async_trait]
impl ObjectAnalyzer for OlmCsvAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_csv()
    }

    async fn analyze(&self, _eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let Some(Value::Array(entries)) = obj.raw.pointer("/status/conditions") else {
            return ObjectStatus::unknown(obj);
        };

        let mut conditions: Vec<Condition> = Vec::new();
        for entry in entries {
            let Ok(mut condition) = serde_json::from_value::<Condition>(entry.clone()) else {
                continue;
            };
            // CSVs use "phase" instead of "type" for the condition type.
            if let Some(phase) = entry.get("phase").and_then(Value::as_str) {
                condition.type_ = phase.to_string();
            }
            conditions.push(condition);
        }

        let chain: Vec<Arc<dyn ConditionAnalyzer>> = vec![Arc::new(OlmCsvConditionAnalyzer)];
        let condition_statuses = analyze_conditions(&conditions, &chain);

        aggregate_result(obj, Vec::new(), condition_statuses)
    }
}

/// A CSV in phase `Failed` is an error; any other phase is left for the
/// overall aggregation to interpret.
struct OlmCsvConditionAnalyzer;

impl ConditionAnalyzer for OlmCsvConditionAnalyzer {
    fn analyze(&self, cond: &Condition) -> Option<crate::status::ConditionStatus> {
        if cond.type_ == "Failed" {
            return Some(condition_status_error(cond.clone()));
        }
        None
    }
}
