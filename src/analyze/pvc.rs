//! PersistentVolumeClaim analyzer

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::analyze::aggregate_result;
use crate::analyze::conditions::{synthetic_error, synthetic_ok, synthetic_progressing};
use crate::eval::{Evaluator, ObjectAnalyzer};
use crate::object::{GroupKind, Object};
use crate::status::ObjectStatus;

pub struct PvcAnalyzer;

#[async_trait]
impl ObjectAnalyzer for PvcAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == GroupKind::core("PersistentVolumeClaim")
    }

    async fn analyze(&self, _eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus {
        let phase = obj
            .raw
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or("");

        let condition = match phase {
            "Bound" => synthetic_ok("Bound", "PVC is bound."),
            // A pending claim is waiting for a volume to become available.
            "Pending" => synthetic_progressing("NotBound", "Available", "PVC is not bound."),
            other => synthetic_error("NotBound", other, "PVC is not bound."),
        };

        aggregate_result(obj, Vec::new(), vec![condition])
    }
}
