//! Service analyzer

use std::sync::Arc;

use async_trait::async_trait;

use crate::analyze::aggregate_result;
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, Object};
use crate::query::Query;
use crate::status::ObjectStatus;

/// A service has no health of its own; it inherits the aggregated health of
/// the pods its selector matches.
pub struct ServiceAnalyzer;

#[async_trait]
impl ObjectAnalyzer for ServiceAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == GroupKind::core("Service")
    }

    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let query = Query::Selector {
            owner: Arc::clone(&obj),
            child_kind: GroupKind::core("Pod"),
        };
        let children = match eval.eval_query(&query, None).await {
            Ok(children) => children,
            Err(e) => return ObjectStatus::unknown_with_error(obj, &e),
        };

        aggregate_result(obj, children, Vec::new())
    }
}
