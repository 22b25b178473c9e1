//! Feature flag model
//!
//! Immutable descriptions of flags as delivered by the control plane: ordered
//! variation lists, individual user targets, rules built from typed clauses,
//! percentage rollouts, and prerequisite edges to other flags. These structs
//! mirror the wire JSON schema; evaluation semantics live in [`crate::eval`].

use super::value::Value;
use serde::{Deserialize, Serialize};

/// A feature flag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flag {
    /// Unique flag key
    pub key: String,

    /// Version, monotonically increased by the control plane
    pub version: u64,

    /// Whether targeting is on; an off flag serves its off variation
    pub on: bool,

    /// Ordered list of possible values; variation indexes point into this
    pub variations: Vec<Value>,

    /// Variation or rollout served when no target or rule matches
    pub fallthrough: VariationOrRollout,

    /// Variation served when the flag is off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_variation: Option<usize>,

    /// Individual user targeting lists
    pub targets: Vec<Target>,

    /// Targeting rules, evaluated in order
    pub rules: Vec<FlagRule>,

    /// Flags that must evaluate to a specific variation first
    pub prerequisites: Vec<Prerequisite>,

    /// Salt mixed into rollout bucketing
    pub salt: String,

    /// Whether evaluation events are tracked for this flag
    pub track_events: bool,

    /// Whether fallthrough evaluations are tracked for experimentation
    pub track_events_fallthrough: bool,

    /// Debug-event cutoff as milliseconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_events_until_date: Option<u64>,

    /// Whether the flag is available to client-side SDKs
    pub client_side: bool,

    /// Deletion marker used in full-set payloads
    pub deleted: bool,
}

impl Flag {
    /// The value at the given variation index, if in range
    pub fn variation_value(&self, index: usize) -> Option<&Value> {
        self.variations.get(index)
    }
}

/// An individual-user targeting entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    /// Variation served to the listed users
    pub variation: usize,

    /// User keys receiving this variation
    pub values: Vec<String>,
}

/// A prerequisite edge to another flag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Prerequisite {
    /// Key of the prerequisite flag
    pub key: String,

    /// Variation the prerequisite must evaluate to
    pub variation: usize,
}

/// A targeting rule; all clauses must match
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlagRule {
    /// Stable rule identifier assigned by the control plane
    pub id: String,

    /// Conditions that must all hold for the rule to match
    pub clauses: Vec<Clause>,

    /// What the rule serves when it matches
    #[serde(flatten)]
    pub variation_or_rollout: VariationOrRollout,

    /// Whether matches of this rule are tracked for experimentation
    pub track_events: bool,
}

/// A single condition within a rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Clause {
    /// User attribute the clause reads
    pub attribute: String,

    /// Comparison operator
    pub op: Operator,

    /// Operand values; the clause matches if any of them matches
    pub values: Vec<Value>,

    /// Invert the result of the match
    pub negate: bool,
}

/// The closed set of clause operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// Equality against any of the clause values
    #[default]
    In,
    /// String suffix match
    EndsWith,
    /// String prefix match
    StartsWith,
    /// Regular expression match
    Matches,
    /// Substring match
    Contains,
    /// Numeric less-than
    LessThan,
    /// Numeric less-than-or-equal
    LessThanOrEqual,
    /// Numeric greater-than
    GreaterThan,
    /// Numeric greater-than-or-equal
    GreaterThanOrEqual,
    /// Timestamp strictly earlier
    Before,
    /// Timestamp strictly later
    After,
    /// Semantic version equality
    SemVerEqual,
    /// Semantic version less-than
    SemVerLessThan,
    /// Semantic version greater-than
    SemVerGreaterThan,
    /// Membership in any of the referenced segments
    SegmentMatch,
}

/// Either a fixed variation index or a percentage rollout
///
/// Exactly one of the two fields is expected to be set; a value with neither
/// is treated as a malformed flag at evaluation time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariationOrRollout {
    /// Fixed variation index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<usize>,

    /// Percentage rollout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<Rollout>,
}

impl VariationOrRollout {
    /// A fixed variation
    pub fn fixed(variation: usize) -> Self {
        VariationOrRollout {
            variation: Some(variation),
            rollout: None,
        }
    }
}

/// A percentage rollout over weighted variations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rollout {
    /// Whether this is a plain rollout or an experiment
    pub kind: RolloutKind,

    /// Attribute used for bucketing; defaults to `key`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,

    /// Weighted variations; weights sum to 100000
    pub variations: Vec<WeightedVariation>,
}

/// Discriminates plain rollouts from experiments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutKind {
    /// Plain percentage rollout
    #[default]
    Rollout,
    /// Experiment; untracked buckets are excluded from analysis
    Experiment,
}

/// One bucket of a rollout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightedVariation {
    /// Variation index served to this bucket
    pub variation: usize,

    /// Bucket weight out of 100000
    pub weight: u32,

    /// Experiment buckets excluded from analysis
    pub untracked: bool,
}
