//! User segment model
//!
//! A segment defines user-set membership by explicit inclusion and exclusion
//! lists plus rules, and is referenced from flag rules via the `segmentMatch`
//! operator. Membership semantics live in [`crate::eval`].

use super::flag::Clause;
use serde::{Deserialize, Serialize};

/// A named, versioned collection of users
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Segment {
    /// Unique segment key
    pub key: String,

    /// Version, monotonically increased by the control plane
    pub version: u64,

    /// User keys that are always members
    pub included: Vec<String>,

    /// User keys that are never members; checked after `included`
    pub excluded: Vec<String>,

    /// Salt mixed into segment rule bucketing
    pub salt: String,

    /// Membership rules, evaluated in order
    pub rules: Vec<SegmentRule>,

    /// Deletion marker used in full-set payloads
    pub deleted: bool,
}

/// A membership rule; all clauses must match, then the optional weight
/// applies a secondary bucket filter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentRule {
    /// Conditions that must all hold
    pub clauses: Vec<Clause>,

    /// Bucket weight out of 100000; absent means unconditional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,

    /// Attribute used for weight bucketing; defaults to `key`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
}
