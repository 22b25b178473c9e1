//! Clause comparison operators
//!
//! Each operator compares one user attribute value against one clause operand.
//! Operators are total: a type mismatch, malformed regex, bad timestamp, or
//! unparseable version is a non-match, never an error.

use crate::model::{Operator, Value};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::cmp::Ordering;

// Permits versions with a missing minor or patch component, which the strict
// semver 2.0 grammar rejects.
static RELAXED_SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<major>0|[1-9]\d*)(\.(?P<minor>0|[1-9]\d*))?(\.(?P<patch>0|[1-9]\d*))?(?P<rest>[-+].*)?$")
        .expect("valid regex")
});

/// Apply an operator to a single pair of values
///
/// `segmentMatch` is resolved by the evaluator before operators are consulted
/// and always yields false here.
pub fn apply(op: Operator, user_value: &Value, clause_value: &Value) -> bool {
    match op {
        Operator::In => user_value == clause_value,
        Operator::StartsWith => string_op(user_value, clause_value, |u, c| u.starts_with(c)),
        Operator::EndsWith => string_op(user_value, clause_value, |u, c| u.ends_with(c)),
        Operator::Contains => string_op(user_value, clause_value, |u, c| u.contains(c)),
        Operator::Matches => string_op(user_value, clause_value, |u, pattern| {
            Regex::new(pattern).map(|re| re.is_match(u)).unwrap_or(false)
        }),
        Operator::LessThan => numeric_op(user_value, clause_value, |u, c| u < c),
        Operator::LessThanOrEqual => numeric_op(user_value, clause_value, |u, c| u <= c),
        Operator::GreaterThan => numeric_op(user_value, clause_value, |u, c| u > c),
        Operator::GreaterThanOrEqual => numeric_op(user_value, clause_value, |u, c| u >= c),
        Operator::Before => time_op(user_value, clause_value, |u, c| u < c),
        Operator::After => time_op(user_value, clause_value, |u, c| u > c),
        Operator::SemVerEqual => semver_op(user_value, clause_value, Ordering::is_eq),
        Operator::SemVerLessThan => semver_op(user_value, clause_value, Ordering::is_lt),
        Operator::SemVerGreaterThan => semver_op(user_value, clause_value, Ordering::is_gt),
        Operator::SegmentMatch => false,
    }
}

fn string_op(user_value: &Value, clause_value: &Value, op: impl Fn(&str, &str) -> bool) -> bool {
    match (user_value.as_str(), clause_value.as_str()) {
        (Some(u), Some(c)) => op(u, c),
        _ => false,
    }
}

fn numeric_op(user_value: &Value, clause_value: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (user_value.as_f64(), clause_value.as_f64()) {
        (Some(u), Some(c)) => op(u, c),
        _ => false,
    }
}

fn time_op(user_value: &Value, clause_value: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (parse_timestamp(user_value), parse_timestamp(clause_value)) {
        (Some(u), Some(c)) => op(u, c),
        _ => false,
    }
}

// Accepts RFC3339 strings or numbers as milliseconds since epoch.
fn parse_timestamp(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis() as f64),
        _ => value.as_f64(),
    }
}

fn semver_op(user_value: &Value, clause_value: &Value, op: impl Fn(Ordering) -> bool) -> bool {
    match (parse_semver(user_value), parse_semver(clause_value)) {
        (Some(u), Some(c)) => op(u.cmp_precedence(&c)),
        _ => false,
    }
}

// Semver 2.0, relaxed so that "2" and "2.1" parse as "2.0.0" and "2.1.0".
fn parse_semver(value: &Value) -> Option<Version> {
    let s = value.as_str()?;
    if let Ok(version) = Version::parse(s) {
        return Some(version);
    }
    let captures = RELAXED_SEMVER.captures(s)?;
    let padded = format!(
        "{}.{}.{}{}",
        &captures["major"],
        captures.name("minor").map_or("0", |m| m.as_str()),
        captures.name("patch").map_or("0", |m| m.as_str()),
        captures.name("rest").map_or("", |m| m.as_str()),
    );
    Version::parse(&padded).ok()
}
