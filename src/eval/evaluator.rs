//! Flag evaluation
//!
//! The evaluator is a pure function from `(flag, user, data view)` to a
//! [`Detail`]: no I/O beyond the [`DataReader`] it is given, no shared mutable
//! state, safe to call from any number of threads. Prerequisite chains and
//! segment references are traversed with visited-sets so malformed (cyclic)
//! data terminates instead of recursing forever.

use super::bucketing::bucket_user;
use super::operators;
use super::reason::{ErrorKind, Reason};
use crate::model::{
    Clause, Flag, Operator, RolloutKind, Segment, SegmentRule, User, Value, VariationOrRollout,
};
use crate::store::{DataKind, DataStore, StoreItem};
use std::collections::HashSet;
use tracing::warn;

/// The outcome of evaluating one flag for one user
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    /// The variation value, absent on error or when an off flag has no off
    /// variation
    pub value: Option<Value>,
    /// Index of the variation served, absent when no variation applies
    pub variation_index: Option<usize>,
    /// Why this result was produced
    pub reason: Reason,
}

impl Detail {
    pub(crate) fn error(kind: ErrorKind) -> Detail {
        Detail {
            value: None,
            variation_index: None,
            reason: Reason::error(kind),
        }
    }

    /// The value, or the given default when absent
    pub fn value_or(self, default: Value) -> Value {
        self.value.unwrap_or(default)
    }

    /// Extract a boolean value; a non-boolean value yields the default with a
    /// `WRONG_TYPE` error reason
    pub fn bool_or(self, default: bool) -> (bool, Reason) {
        match self.value {
            Some(Value::Bool(b)) => (b, self.reason),
            Some(_) => (default, Reason::error(ErrorKind::WrongType)),
            None => (default, self.reason),
        }
    }

    /// Extract an integer value; integral doubles are accepted
    pub fn int_or(self, default: i64) -> (i64, Reason) {
        match &self.value {
            Some(value) => match value.as_int() {
                Some(n) => (n, self.reason),
                None => (default, Reason::error(ErrorKind::WrongType)),
            },
            None => (default, self.reason),
        }
    }

    /// Extract a numeric value as a double
    pub fn double_or(self, default: f64) -> (f64, Reason) {
        match &self.value {
            Some(value) => match value.as_f64() {
                Some(d) => (d, self.reason),
                None => (default, Reason::error(ErrorKind::WrongType)),
            },
            None => (default, self.reason),
        }
    }

    /// Extract a string value
    pub fn string_or(self, default: &str) -> (String, Reason) {
        match self.value {
            Some(Value::String(s)) => (s, self.reason),
            Some(_) => (default.to_string(), Reason::error(ErrorKind::WrongType)),
            None => (default.to_string(), self.reason),
        }
    }

    /// Extract the value as arbitrary JSON; any type is accepted
    pub fn json_or(self, default: Value) -> (Value, Reason) {
        match self.value {
            Some(value) => (value, self.reason),
            None => (default, self.reason),
        }
    }
}

/// Data emitted for each prerequisite evaluated on the way to a result
///
/// Analytics pipelines turn these into feature events; they are ordered so
/// that a prerequisite's event precedes the event of the flag that required
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct PrerequisiteEvent {
    /// Key of the prerequisite flag that was evaluated
    pub prerequisite_key: String,
    /// Key of the flag that required it
    pub flag_key: String,
    /// Value the prerequisite evaluated to
    pub value: Option<Value>,
    /// Variation index the prerequisite evaluated to
    pub variation_index: Option<usize>,
    /// Version of the prerequisite flag
    pub version: u64,
    /// Why the prerequisite evaluated the way it did
    pub reason: Reason,
}

/// A [`Detail`] plus the prerequisite events the evaluation produced
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// The evaluation outcome
    pub detail: Detail,
    /// Events for every prerequisite evaluation, in emission order
    pub prerequisite_events: Vec<PrerequisiteEvent>,
}

impl EvalResult {
    pub(crate) fn error(kind: ErrorKind) -> EvalResult {
        EvalResult {
            detail: Detail::error(kind),
            prerequisite_events: Vec::new(),
        }
    }
}

/// The read capability the evaluator consumes
///
/// Lookups return live items only; tombstones and store failures read as
/// absent.
pub trait DataReader {
    /// Look up a flag by key
    fn flag(&self, key: &str) -> Option<Flag>;
    /// Look up a segment by key
    fn segment(&self, key: &str) -> Option<Segment>;
}

/// [`DataReader`] over any [`DataStore`]
pub struct StoreDataReader<'a> {
    store: &'a dyn DataStore,
}

impl<'a> StoreDataReader<'a> {
    /// Wrap the given store
    pub fn new(store: &'a dyn DataStore) -> Self {
        StoreDataReader { store }
    }
}

impl DataReader for StoreDataReader<'_> {
    fn flag(&self, key: &str) -> Option<Flag> {
        match self.store.get(DataKind::Flags, key) {
            Ok(Some(descriptor)) => match descriptor.item {
                StoreItem::Flag(flag) => Some(flag),
                _ => None,
            },
            Ok(None) => None,
            Err(error) => {
                warn!(%error, key, "flag lookup failed");
                None
            }
        }
    }

    fn segment(&self, key: &str) -> Option<Segment> {
        match self.store.get(DataKind::Segments, key) {
            Ok(Some(descriptor)) => match descriptor.item {
                StoreItem::Segment(segment) => Some(segment),
                _ => None,
            },
            Ok(None) => None,
            Err(error) => {
                warn!(%error, key, "segment lookup failed");
                None
            }
        }
    }
}

/// Evaluates flags against a fixed data view
pub struct Evaluator<'a> {
    reader: &'a dyn DataReader,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over the given data view
    pub fn new(reader: &'a dyn DataReader) -> Self {
        Evaluator { reader }
    }

    /// Evaluate a flag for a user
    pub fn evaluate(&self, flag: &Flag, user: &User) -> EvalResult {
        if user.key.is_empty() {
            return EvalResult::error(ErrorKind::UserNotSpecified);
        }
        let mut events = Vec::new();
        let mut prereq_chain = HashSet::new();
        prereq_chain.insert(flag.key.clone());
        let detail = self.evaluate_internal(flag, user, &mut prereq_chain, &mut events);
        EvalResult {
            detail,
            prerequisite_events: events,
        }
    }

    fn evaluate_internal(
        &self,
        flag: &Flag,
        user: &User,
        prereq_chain: &mut HashSet<String>,
        events: &mut Vec<PrerequisiteEvent>,
    ) -> Detail {
        if !flag.on {
            return self.off_value(flag, Reason::Off);
        }

        if let Some(failed) = self.check_prerequisites(flag, user, prereq_chain, events) {
            return failed;
        }

        for target in &flag.targets {
            if target.values.iter().any(|key| key == &user.key) {
                return self.variation(flag, target.variation, Reason::TargetMatch);
            }
        }

        for (rule_index, rule) in flag.rules.iter().enumerate() {
            if self.rule_matches(&rule.clauses, user) {
                return self.resolve_variation_or_rollout(
                    flag,
                    &rule.variation_or_rollout,
                    user,
                    |in_experiment| Reason::RuleMatch {
                        rule_index,
                        rule_id: rule.id.clone(),
                        in_experiment,
                    },
                );
            }
        }

        self.resolve_variation_or_rollout(flag, &flag.fallthrough, user, |in_experiment| {
            Reason::Fallthrough { in_experiment }
        })
    }

    // Returns the failure detail if any prerequisite is not satisfied.
    fn check_prerequisites(
        &self,
        flag: &Flag,
        user: &User,
        prereq_chain: &mut HashSet<String>,
        events: &mut Vec<PrerequisiteEvent>,
    ) -> Option<Detail> {
        for prerequisite in &flag.prerequisites {
            if prereq_chain.contains(&prerequisite.key) {
                warn!(
                    flag = %flag.key,
                    prerequisite = %prerequisite.key,
                    "prerequisite cycle detected"
                );
                return Some(Detail::error(ErrorKind::MalformedFlag));
            }
            let Some(prereq_flag) = self.reader.flag(&prerequisite.key) else {
                return Some(self.off_value(
                    flag,
                    Reason::PrerequisiteFailed {
                        prerequisite_key: prerequisite.key.clone(),
                    },
                ));
            };

            prereq_chain.insert(prerequisite.key.clone());
            let prereq_detail = self.evaluate_internal(&prereq_flag, user, prereq_chain, events);
            prereq_chain.remove(&prerequisite.key);

            events.push(PrerequisiteEvent {
                prerequisite_key: prerequisite.key.clone(),
                flag_key: flag.key.clone(),
                value: prereq_detail.value.clone(),
                variation_index: prereq_detail.variation_index,
                version: prereq_flag.version,
                reason: prereq_detail.reason.clone(),
            });

            if prereq_detail.reason.is_error() {
                return Some(Detail {
                    value: None,
                    variation_index: None,
                    reason: prereq_detail.reason,
                });
            }
            if !prereq_flag.on || prereq_detail.variation_index != Some(prerequisite.variation) {
                return Some(self.off_value(
                    flag,
                    Reason::PrerequisiteFailed {
                        prerequisite_key: prerequisite.key.clone(),
                    },
                ));
            }
        }
        None
    }

    fn rule_matches(&self, clauses: &[Clause], user: &User) -> bool {
        clauses.iter().all(|clause| {
            let mut segment_chain = HashSet::new();
            self.clause_matches(clause, user, &mut segment_chain)
        })
    }

    fn clause_matches(
        &self,
        clause: &Clause,
        user: &User,
        segment_chain: &mut HashSet<String>,
    ) -> bool {
        if clause.op == Operator::SegmentMatch {
            let matched = clause.values.iter().any(|value| {
                value
                    .as_str()
                    .map_or(false, |key| self.segment_contains(key, user, segment_chain))
            });
            return matched != clause.negate;
        }

        // A missing attribute is a non-match; negate does not apply.
        let Some(user_value) = user.attribute(&clause.attribute) else {
            return false;
        };
        let matched = match &user_value {
            Value::Array(elements) => elements.iter().any(|element| {
                clause
                    .values
                    .iter()
                    .any(|operand| operators::apply(clause.op, element, operand))
            }),
            scalar => clause
                .values
                .iter()
                .any(|operand| operators::apply(clause.op, scalar, operand)),
        };
        matched != clause.negate
    }

    fn segment_contains(
        &self,
        segment_key: &str,
        user: &User,
        segment_chain: &mut HashSet<String>,
    ) -> bool {
        if !segment_chain.insert(segment_key.to_string()) {
            warn!(segment = segment_key, "segment reference cycle detected");
            return false;
        }
        let result = match self.reader.segment(segment_key) {
            Some(segment) => self.segment_matches_user(&segment, user, segment_chain),
            None => false,
        };
        segment_chain.remove(segment_key);
        result
    }

    fn segment_matches_user(
        &self,
        segment: &Segment,
        user: &User,
        segment_chain: &mut HashSet<String>,
    ) -> bool {
        if segment.included.iter().any(|key| key == &user.key) {
            return true;
        }
        if segment.excluded.iter().any(|key| key == &user.key) {
            return false;
        }
        segment
            .rules
            .iter()
            .any(|rule| self.segment_rule_matches(segment, rule, user, segment_chain))
    }

    fn segment_rule_matches(
        &self,
        segment: &Segment,
        rule: &SegmentRule,
        user: &User,
        segment_chain: &mut HashSet<String>,
    ) -> bool {
        if !rule
            .clauses
            .iter()
            .all(|clause| self.clause_matches(clause, user, segment_chain))
        {
            return false;
        }
        match rule.weight {
            None => true,
            Some(weight) => {
                let bucket = bucket_user(
                    user,
                    &segment.key,
                    &segment.salt,
                    rule.bucket_by.as_deref(),
                );
                bucket < weight as f64 / 100_000.0
            }
        }
    }

    fn resolve_variation_or_rollout(
        &self,
        flag: &Flag,
        variation_or_rollout: &VariationOrRollout,
        user: &User,
        reason: impl FnOnce(bool) -> Reason,
    ) -> Detail {
        match self.select_variation(flag, variation_or_rollout, user) {
            Some((index, in_experiment)) => self.variation(flag, index, reason(in_experiment)),
            None => Detail::error(ErrorKind::MalformedFlag),
        }
    }

    // Picks a variation index; the second element reports whether an
    // experiment rollout selected a tracked bucket.
    fn select_variation(
        &self,
        flag: &Flag,
        variation_or_rollout: &VariationOrRollout,
        user: &User,
    ) -> Option<(usize, bool)> {
        if let Some(index) = variation_or_rollout.variation {
            return Some((index, false));
        }
        let rollout = variation_or_rollout.rollout.as_ref()?;
        let last = rollout.variations.last()?;

        let bucket = bucket_user(user, &flag.key, &flag.salt, rollout.bucket_by.as_deref());
        let mut cumulative = 0.0;
        // The last bucket absorbs any rounding shortfall in the weights.
        let mut selected = last;
        for weighted in &rollout.variations {
            cumulative += weighted.weight as f64 / 100_000.0;
            if bucket < cumulative {
                selected = weighted;
                break;
            }
        }
        let in_experiment = rollout.kind == RolloutKind::Experiment && !selected.untracked;
        Some((selected.variation, in_experiment))
    }

    fn off_value(&self, flag: &Flag, reason: Reason) -> Detail {
        match flag.off_variation {
            Some(index) => self.variation(flag, index, reason),
            None => Detail {
                value: None,
                variation_index: None,
                reason,
            },
        }
    }

    fn variation(&self, flag: &Flag, index: usize, reason: Reason) -> Detail {
        match flag.variation_value(index) {
            Some(value) => Detail {
                value: Some(value.clone()),
                variation_index: Some(index),
                reason,
            },
            None => Detail::error(ErrorKind::MalformedFlag),
        }
    }
}
