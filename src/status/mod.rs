//! Status model: verdicts, conditions and the per-object status tree

use std::fmt;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

use crate::error::KhError;
use crate::object::Object;

/// Reduces the status of an object to a single value.
///
/// The ordering matters: when aggregating, the worst verdict dominates, and
/// `Unknown` never overrides actual evidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Unknown,
    Ok,
    Warning,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unknown => "Unknown",
            Verdict::Ok => "Ok",
            Verdict::Warning => "Warning",
            Verdict::Error => "Error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The core structure representing the status of an object.
///
/// `progressing` is orthogonal to the verdict: a resource may still be
/// progressing while everything observed so far is fine.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub result: Verdict,
    pub progressing: bool,
    /// Human readable status.
    pub message: String,
    /// Error that appeared during the evaluation.
    pub error: Option<String>,
}

impl Status {
    pub fn from_result(result: Verdict) -> Self {
        Status {
            result,
            message: result.as_str().to_string(),
            ..Default::default()
        }
    }
}

/// A condition read from a resource's status.
///
/// Deserialization is lenient: resources routinely omit fields, and condition
/// schemas vary between API groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: Option<Time>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    pub fn is_false(&self) -> bool {
        self.status == "False"
    }
}

/// A condition paired with the status derived from it.
#[derive(Debug, Clone)]
pub struct ConditionStatus {
    pub condition: Condition,
    pub status: Status,
}

/// The status tree node produced by the evaluator for one object.
#[derive(Debug, Clone)]
pub struct ObjectStatus {
    /// The subject of the status.
    pub object: Arc<Object>,
    /// Overall status of the object.
    pub status: Status,
    /// Conditions of the object.
    pub conditions: Vec<ConditionStatus>,
    /// Statuses of the sub-objects (e.g. pods of a replicaset).
    pub children: Vec<ObjectStatus>,
}

impl ObjectStatus {
    pub fn unknown(object: Arc<Object>) -> ObjectStatus {
        ObjectStatus {
            object,
            status: Status::from_result(Verdict::Unknown),
            conditions: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn unknown_with_error(object: Arc<Object>, err: &KhError) -> ObjectStatus {
        let mut status = Status::from_result(Verdict::Unknown);
        status.error = Some(err.to_string());
        ObjectStatus {
            object,
            status,
            conditions: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn ok(object: Arc<Object>, children: Vec<ObjectStatus>) -> ObjectStatus {
        ObjectStatus {
            object,
            status: Status::from_result(Verdict::Ok),
            conditions: Vec::new(),
            children,
        }
    }

    /// The condition with the given type, if present.
    pub fn get_condition(&self, cond_type: &str) -> Option<&ConditionStatus> {
        self.conditions
            .iter()
            .find(|c| c.condition.type_ == cond_type)
    }
}
