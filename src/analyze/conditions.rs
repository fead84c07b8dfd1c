//! Condition analyzers: rules mapping a single condition to a derived status

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::object::Object;
use crate::status::{Condition, ConditionStatus, Status, Verdict};

/// A pure rule deriving a status from one condition.
pub trait ConditionAnalyzer: Send + Sync {
    /// Derive the status, or `None` when this analyzer does not recognize
    /// the condition.
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus>;
}

/// `Ready=True` is healthy, `Ready=False` is a failure.
pub struct ReadyConditionAnalyzer;

impl ConditionAnalyzer for ReadyConditionAnalyzer {
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus> {
        if cond.type_ != "Ready" {
            return None;
        }
        let result = if cond.is_true() {
            Verdict::Ok
        } else if cond.is_false() {
            Verdict::Error
        } else {
            Verdict::Unknown
        };
        Some(ConditionStatus {
            condition: cond.clone(),
            status: Status::from_result(result),
        })
    }
}

/// `Progressing=True` marks the object as progressing. A false progressing
/// condition doesn't tell whether things went well; other conditions decide
/// failure, so it counts as Ok.
pub struct ProgressingConditionAnalyzer;

impl ConditionAnalyzer for ProgressingConditionAnalyzer {
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus> {
        if cond.type_ != "Progressing" {
            return None;
        }
        if cond.is_true() {
            Some(condition_status_progressing(cond.clone()))
        } else {
            Some(condition_status_ok(cond.clone()))
        }
    }
}

/// Matches a condition type by exact name or by regular expression.
pub enum ConditionMatcher {
    Exact(String),
    Pattern(Regex),
}

impl ConditionMatcher {
    pub fn exact<const N: usize>(types: [&str; N]) -> Vec<ConditionMatcher> {
        types
            .iter()
            .map(|t| ConditionMatcher::Exact(t.to_string()))
            .collect()
    }

    /// Matchers from regular expressions. Invalid patterns are a programming
    /// error in a registration call.
    pub fn patterns<const N: usize>(patterns: [&str; N]) -> Vec<ConditionMatcher> {
        patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok().map(ConditionMatcher::Pattern))
            .collect()
    }

    pub fn matches(&self, cond_type: &str) -> bool {
        match self {
            ConditionMatcher::Exact(t) => t == cond_type,
            ConditionMatcher::Pattern(re) => re.is_match(cond_type),
        }
    }
}

fn any_match(matchers: &[ConditionMatcher], cond_type: &str) -> bool {
    matchers.iter().any(|m| m.matches(cond_type))
}

/// Configurable analyzer usable for any condition type.
///
/// By default a true condition is Ok and a false one is an error. Types
/// listed in `reversed_polarity` are treated the other way around (e.g.
/// `Degraded`). Types matched by `warning` report Warning instead of Error,
/// and types matched by `progressing` report progressing while true,
/// regardless of the result.
#[derive(Default)]
pub struct GenericConditionAnalyzer {
    pub match_all: bool,
    pub conditions: Vec<ConditionMatcher>,
    pub reversed_polarity: Vec<ConditionMatcher>,
    pub warning: Vec<ConditionMatcher>,
    pub progressing: Vec<ConditionMatcher>,
}

impl ConditionAnalyzer for GenericConditionAnalyzer {
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus> {
        let recognized = self.match_all
            || any_match(&self.conditions, &cond.type_)
            || any_match(&self.reversed_polarity, &cond.type_)
            || any_match(&self.warning, &cond.type_)
            || any_match(&self.progressing, &cond.type_);
        if !recognized {
            return None;
        }

        let reversed = any_match(&self.reversed_polarity, &cond.type_);
        let mut result = Verdict::Unknown;
        if cond.is_true() {
            result = if reversed { Verdict::Error } else { Verdict::Ok };
        } else if cond.is_false() {
            result = if reversed { Verdict::Ok } else { Verdict::Error };
        }

        if result == Verdict::Error && any_match(&self.warning, &cond.type_) {
            result = Verdict::Warning;
        }

        let progressing = cond.is_true() && any_match(&self.progressing, &cond.type_);

        Some(ConditionStatus {
            condition: cond.clone(),
            status: Status {
                result,
                progressing,
                message: result.as_str().to_string(),
                error: None,
            },
        })
    }
}

/// The analyzers applied to conditions no specific rule claimed.
pub fn default_condition_analyzers() -> Vec<Arc<dyn ConditionAnalyzer>> {
    vec![
        Arc::new(ReadyConditionAnalyzer),
        Arc::new(ProgressingConditionAnalyzer),
    ]
}

/// Apply the analyzers in order; the first match wins, otherwise the
/// condition is classified Unknown.
pub fn analyze_conditions(
    conditions: &[Condition],
    analyzers: &[Arc<dyn ConditionAnalyzer>],
) -> Vec<ConditionStatus> {
    conditions
        .iter()
        .map(|cond| {
            analyzers
                .iter()
                .find_map(|a| a.analyze(cond))
                .unwrap_or_else(|| condition_status_unknown(cond.clone()))
        })
        .collect()
}

/// Read `status.conditions` from the raw object, skipping malformed entries.
pub fn object_conditions(obj: &Object) -> Vec<Condition> {
    let Some(Value::Array(conditions)) = obj.raw.pointer("/status/conditions") else {
        return Vec::new();
    };
    conditions
        .iter()
        .filter_map(|c| serde_json::from_value(c.clone()).ok())
        .collect()
}

/// Analyze the object's own condition set with the given analyzer chain.
pub fn analyze_object_conditions(
    obj: &Object,
    analyzers: &[Arc<dyn ConditionAnalyzer>],
) -> Vec<ConditionStatus> {
    analyze_conditions(&object_conditions(obj), analyzers)
}

fn with_status(condition: Condition, result: Verdict, progressing: bool) -> ConditionStatus {
    ConditionStatus {
        condition,
        status: Status {
            result,
            progressing,
            message: result.as_str().to_string(),
            error: None,
        },
    }
}

pub fn condition_status_ok(condition: Condition) -> ConditionStatus {
    with_status(condition, Verdict::Ok, false)
}

pub fn condition_status_warning(condition: Condition) -> ConditionStatus {
    with_status(condition, Verdict::Warning, false)
}

pub fn condition_status_error(condition: Condition) -> ConditionStatus {
    with_status(condition, Verdict::Error, false)
}

pub fn condition_status_unknown(condition: Condition) -> ConditionStatus {
    with_status(condition, Verdict::Unknown, false)
}

pub fn condition_status_unknown_with_error(
    condition: Condition,
    error: impl ToString,
) -> ConditionStatus {
    let mut cs = with_status(condition, Verdict::Unknown, false);
    cs.status.error = Some(error.to_string());
    cs
}

pub fn condition_status_progressing(condition: Condition) -> ConditionStatus {
    with_status(condition, Verdict::Unknown, true)
}

/// Manufacture a condition not present on the object, used to communicate a
/// finding. Synthetic conditions carry no transition time.
pub fn synthetic_condition(
    cond_type: &str,
    status: bool,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        type_: cond_type.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: None,
    }
}

pub fn synthetic_ok(cond_type: &str, message: &str) -> ConditionStatus {
    condition_status_ok(synthetic_condition(cond_type, true, "", message))
}

pub fn synthetic_warning(cond_type: &str, reason: &str, message: &str) -> ConditionStatus {
    condition_status_warning(synthetic_condition(cond_type, true, reason, message))
}

pub fn synthetic_error(cond_type: &str, reason: &str, message: &str) -> ConditionStatus {
    condition_status_error(synthetic_condition(cond_type, false, reason, message))
}

pub fn synthetic_progressing(cond_type: &str, reason: &str, message: &str) -> ConditionStatus {
    condition_status_progressing(synthetic_condition(cond_type, false, reason, message))
}
