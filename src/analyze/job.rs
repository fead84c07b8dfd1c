//! Job analyzer

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::analyze::aggregate_result;
use crate::analyze::conditions::{
    analyze_object_conditions, default_condition_analyzers, synthetic_progressing,
    ConditionAnalyzer, ConditionMatcher, GenericConditionAnalyzer,
};
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, Object};
use crate::status::ObjectStatus;

pub struct JobAnalyzer;

#[async_trait]
impl ObjectAnalyzer for JobAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == GroupKind::new("batch", "Job")
    }

    async fn analyze(&self, _eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let mut chain: Vec<Arc<dyn ConditionAnalyzer>> = vec![Arc::new(GenericConditionAnalyzer {
            conditions: ConditionMatcher::exact(["Complete"]),
            reversed_polarity: ConditionMatcher::exact(["Failed"]),
            ..Default::default()
        })];
        chain.extend(default_condition_analyzers());

        let mut conditions = analyze_object_conditions(&obj, &chain);

        let count = |field: &str| {
            obj.raw
                .pointer(&format!("/status/{field}"))
                .and_then(Value::as_i64)
                .unwrap_or(0)
        };
        let active = count("active");
        if active > 0 {
            conditions.push(synthetic_progressing(
                "Pods",
                "Active",
                &format!(
                    "Active: {active}, Succeeded: {}, Failed: {}",
                    count("succeeded"),
                    count("failed")
                ),
            ));
        }

        aggregate_result(obj, Vec::new(), conditions)
    }
}
