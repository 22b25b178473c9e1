//! Evaluation reasons
//!
//! Every evaluation produces exactly one [`Reason`] explaining the result.
//! Reasons are stable identifiers consumed by downstream analytics, so their
//! serialized forms are bit-exact: the `kind` discriminant in
//! SCREAMING_SNAKE_CASE, payload fields in camelCase, and the `inExperiment`
//! marker omitted when false.

use serde::{Deserialize, Serialize};

/// Why an evaluation produced the result it did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// The flag is off and served its off variation
    Off,

    /// No target or rule matched; the fallthrough variation was served
    #[serde(rename_all = "camelCase")]
    Fallthrough {
        /// Set when an experiment rollout selected a tracked bucket
        #[serde(default, skip_serializing_if = "is_false")]
        in_experiment: bool,
    },

    /// The user key is in one of the flag's target lists
    TargetMatch,

    /// A rule matched the user
    #[serde(rename_all = "camelCase")]
    RuleMatch {
        /// Position of the rule in the flag's rule list
        rule_index: usize,
        /// Stable rule identifier
        #[serde(default)]
        rule_id: String,
        /// Set when an experiment rollout selected a tracked bucket
        #[serde(default, skip_serializing_if = "is_false")]
        in_experiment: bool,
    },

    /// A prerequisite flag did not evaluate to its required variation
    #[serde(rename_all = "camelCase")]
    PrerequisiteFailed {
        /// Key of the failing prerequisite flag
        prerequisite_key: String,
    },

    /// Evaluation could not be completed
    #[serde(rename_all = "camelCase")]
    Error {
        /// What went wrong
        error_kind: ErrorKind,
    },
}

impl Reason {
    /// Shorthand for an error reason
    pub fn error(error_kind: ErrorKind) -> Self {
        Reason::Error { error_kind }
    }

    /// Whether this reason carries an active experiment marker
    pub fn in_experiment(&self) -> bool {
        match self {
            Reason::Fallthrough { in_experiment } => *in_experiment,
            Reason::RuleMatch { in_experiment, .. } => *in_experiment,
            _ => false,
        }
    }

    /// Whether this is an error reason
    pub fn is_error(&self) -> bool {
        matches!(self, Reason::Error { .. })
    }
}

/// The closed set of evaluation error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Evaluation was attempted before the first full data set arrived
    ClientNotReady,
    /// The flag key is unknown
    FlagNotFound,
    /// The user was nil or had an empty key
    UserNotSpecified,
    /// The flag's data is inconsistent (index out of range, bad rollout)
    MalformedFlag,
    /// A typed variation was requested but the value has a different type
    WrongType,
    /// Unexpected internal failure
    Exception,
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}
