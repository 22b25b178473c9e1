//! Evaluation engine
//!
//! This module turns a flag, a user, and a read view of the data store into a
//! variation plus a structured [`Reason`]:
//! - Typed clause operators and deterministic SHA-1 rollout bucketing
//! - Prerequisite chains and recursive segment membership, both cycle-safe
//! - The all-flags snapshot used to bootstrap client-side SDKs
//!
//! Evaluation never returns an error to the caller; failures surface as
//! `Reason::Error` with a null value, so the host can fall back to its
//! default.

pub mod bucketing;
pub mod evaluator;
pub mod operators;
pub mod reason;
pub mod state;

// Re-exports for convenience
pub use bucketing::bucket_user;
pub use evaluator::{DataReader, Detail, EvalResult, Evaluator, PrerequisiteEvent, StoreDataReader};
pub use reason::{ErrorKind, Reason};
pub use state::{FeatureFlagsState, FlagState, FlagsStateOptions};

use crate::model::User;
use crate::store::DataStore;

/// Evaluate a flag by key against a store
///
/// Covers the lookup-level error cases the evaluator itself cannot see: a
/// store that has not yet received its first full data set yields
/// `CLIENT_NOT_READY`, an unknown key yields `FLAG_NOT_FOUND`.
pub fn evaluate(store: &dyn DataStore, flag_key: &str, user: &User) -> EvalResult {
    if !store.initialized() {
        return EvalResult::error(ErrorKind::ClientNotReady);
    }
    let reader = StoreDataReader::new(store);
    match reader.flag(flag_key) {
        Some(flag) => Evaluator::new(&reader).evaluate(&flag, user),
        None => EvalResult::error(ErrorKind::FlagNotFound),
    }
}
