//! Data model - values, users, flags, and segments
//!
//! This module holds the immutable data types the rest of the SDK operates on:
//! the JSON-like [`Value`] union, the [`User`] principal, and the flag/segment
//! rule structures delivered by the control plane. All wire-facing types
//! round-trip through serde using the control plane's camelCase schema.

pub mod flag;
pub mod segment;
pub mod user;
pub mod value;

// Re-export commonly used types
pub use flag::{
    Clause, Flag, FlagRule, Operator, Prerequisite, Rollout, RolloutKind, Target,
    VariationOrRollout, WeightedVariation,
};
pub use segment::{Segment, SegmentRule};
pub use user::{User, UserBuilder};
pub use value::Value;
