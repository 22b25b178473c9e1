//! All-flags snapshot
//!
//! [`FeatureFlagsState`] captures the result of evaluating every non-deleted
//! flag for one user, in the JSON envelope client-side SDKs bootstrap from:
//! flag values at the top level, per-flag metadata under `"$flagsState"`, and
//! a `"$valid"` marker. A failed prerequisite short-circuits its own flag but
//! never the snapshot.

use super::evaluator::{Evaluator, StoreDataReader};
use super::reason::{is_false, Reason};
use crate::model::{Flag, User, Value};
use crate::store::{DataKind, DataStore, StoreItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Options controlling what an all-flags snapshot includes
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagsStateOptions {
    /// Include evaluation reasons in the metadata
    pub with_reasons: bool,
    /// Only include flags marked as available to client-side SDKs
    pub client_side_only: bool,
    /// Omit version and reason metadata unless the flag is being tracked
    pub details_only_for_tracked_flags: bool,
}

/// Per-flag metadata within a snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlagState {
    /// Variation index served
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<usize>,

    /// Flag version; omitted when details are suppressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    /// Evaluation reason, when requested or required for event tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,

    /// Whether the host should emit full evaluation events for this flag
    #[serde(skip_serializing_if = "is_false")]
    pub track_events: bool,

    /// Whether the reason must be attached to those events
    #[serde(skip_serializing_if = "is_false")]
    pub track_reason: bool,

    /// Debug-event cutoff, propagated from the flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_events_until_date: Option<u64>,
}

/// The result of evaluating all flags for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlagsState {
    #[serde(flatten)]
    values: HashMap<String, Value>,

    #[serde(rename = "$flagsState")]
    metadata: HashMap<String, FlagState>,

    #[serde(rename = "$valid")]
    valid: bool,
}

impl FeatureFlagsState {
    /// An invalid snapshot, produced when the store is unavailable or not
    /// yet initialized
    pub fn invalid() -> Self {
        FeatureFlagsState {
            values: HashMap::new(),
            metadata: HashMap::new(),
            valid: false,
        }
    }

    /// Evaluate every non-deleted flag in the store for the given user
    pub fn build(store: &dyn DataStore, user: &User, options: FlagsStateOptions) -> Self {
        if !store.initialized() {
            return FeatureFlagsState::invalid();
        }
        let all_flags = match store.get_all(DataKind::Flags) {
            Ok(all) => all,
            Err(error) => {
                warn!(%error, "all-flags snapshot could not read the store");
                return FeatureFlagsState::invalid();
            }
        };

        let reader = StoreDataReader::new(store);
        let evaluator = Evaluator::new(&reader);
        let mut state = FeatureFlagsState {
            values: HashMap::new(),
            metadata: HashMap::new(),
            valid: true,
        };

        for descriptor in all_flags.into_values() {
            let StoreItem::Flag(flag) = descriptor.item else {
                continue;
            };
            if options.client_side_only && !flag.client_side {
                continue;
            }
            let detail = evaluator.evaluate(&flag, user).detail;

            let experiment = is_experiment(&flag, &detail.reason);
            let track_events = flag.track_events || experiment;
            let omit_details = options.details_only_for_tracked_flags
                && !(track_events || flag.debug_events_until_date.is_some());
            let reason = ((options.with_reasons || experiment) && !omit_details)
                .then_some(detail.reason);

            state
                .values
                .insert(flag.key.clone(), detail.value.unwrap_or(Value::Null));
            state.metadata.insert(
                flag.key.clone(),
                FlagState {
                    variation: detail.variation_index,
                    version: (!omit_details).then_some(flag.version),
                    reason,
                    track_events,
                    track_reason: experiment,
                    debug_events_until_date: flag.debug_events_until_date,
                },
            );
        }
        state
    }

    /// Whether the snapshot was built from an initialized store
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The evaluated value of one flag
    pub fn value(&self, flag_key: &str) -> Option<&Value> {
        self.values.get(flag_key)
    }

    /// The metadata of one flag
    pub fn flag_state(&self, flag_key: &str) -> Option<&FlagState> {
        self.metadata.get(flag_key)
    }

    /// Number of flags in the snapshot
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no flags
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Experimentation forces event and reason tracking regardless of what the
// host asked for: fallthrough tracking, per-rule tracking, or an active
// experiment bucket.
fn is_experiment(flag: &Flag, reason: &Reason) -> bool {
    if reason.in_experiment() {
        return true;
    }
    match reason {
        Reason::Fallthrough { .. } => flag.track_events_fallthrough,
        Reason::RuleMatch { rule_index, .. } => flag
            .rules
            .get(*rule_index)
            .map_or(false, |rule| rule.track_events),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariationOrRollout;
    use crate::store::{FullDataSet, InMemoryDataStore, ItemDescriptor};

    fn bool_flag(key: &str, version: u64) -> Flag {
        Flag {
            key: key.to_string(),
            version,
            on: true,
            variations: vec![Value::Bool(true), Value::Bool(false)],
            fallthrough: VariationOrRollout::fixed(0),
            off_variation: Some(1),
            salt: "salt".to_string(),
            ..Flag::default()
        }
    }

    fn store_with(flags: Vec<Flag>) -> InMemoryDataStore {
        let store = InMemoryDataStore::new();
        store
            .init(FullDataSet {
                flags: flags
                    .into_iter()
                    .map(|f| (f.key.clone(), ItemDescriptor::flag(f)))
                    .collect(),
                segments: vec![],
            })
            .unwrap();
        store
    }

    #[test]
    fn test_uninitialized_store_yields_invalid_state() {
        let store = InMemoryDataStore::new();
        let state =
            FeatureFlagsState::build(&store, &User::with_key("u"), FlagsStateOptions::default());
        assert!(!state.valid());
        assert!(state.is_empty());
    }

    #[test]
    fn test_snapshot_contains_all_live_flags() {
        let store = store_with(vec![bool_flag("f1", 1), bool_flag("f2", 2)]);
        store
            .upsert(DataKind::Flags, "gone", ItemDescriptor::tombstone(3))
            .unwrap();
        let state =
            FeatureFlagsState::build(&store, &User::with_key("u"), FlagsStateOptions::default());
        assert!(state.valid());
        assert_eq!(state.len(), 2);
        assert_eq!(state.value("f1"), Some(&Value::Bool(true)));
        assert_eq!(state.value("gone"), None);
        let meta = state.flag_state("f2").unwrap();
        assert_eq!(meta.version, Some(2));
        assert_eq!(meta.variation, Some(0));
        assert_eq!(meta.reason, None);
    }

    #[test]
    fn test_with_reasons_option() {
        let store = store_with(vec![bool_flag("f1", 1)]);
        let state = FeatureFlagsState::build(
            &store,
            &User::with_key("u"),
            FlagsStateOptions {
                with_reasons: true,
                ..FlagsStateOptions::default()
            },
        );
        assert_eq!(
            state.flag_state("f1").unwrap().reason,
            Some(Reason::Fallthrough {
                in_experiment: false
            })
        );
    }

    #[test]
    fn test_client_side_only_option() {
        let mut visible = bool_flag("visible", 1);
        visible.client_side = true;
        let store = store_with(vec![visible, bool_flag("hidden", 1)]);
        let state = FeatureFlagsState::build(
            &store,
            &User::with_key("u"),
            FlagsStateOptions {
                client_side_only: true,
                ..FlagsStateOptions::default()
            },
        );
        assert_eq!(state.len(), 1);
        assert!(state.value("visible").is_some());
    }

    #[test]
    fn test_details_only_for_tracked_flags_option() {
        let mut tracked = bool_flag("tracked", 4);
        tracked.track_events = true;
        let store = store_with(vec![tracked, bool_flag("untracked", 9)]);
        let state = FeatureFlagsState::build(
            &store,
            &User::with_key("u"),
            FlagsStateOptions {
                with_reasons: true,
                details_only_for_tracked_flags: true,
                ..FlagsStateOptions::default()
            },
        );
        let tracked_meta = state.flag_state("tracked").unwrap();
        assert_eq!(tracked_meta.version, Some(4));
        assert!(tracked_meta.reason.is_some());
        assert!(tracked_meta.track_events);

        let untracked_meta = state.flag_state("untracked").unwrap();
        assert_eq!(untracked_meta.version, None);
        assert_eq!(untracked_meta.reason, None);
    }

    #[test]
    fn test_experimentation_forces_reason_tracking() {
        let mut flag = bool_flag("exp", 1);
        flag.track_events_fallthrough = true;
        let store = store_with(vec![flag]);
        let state =
            FeatureFlagsState::build(&store, &User::with_key("u"), FlagsStateOptions::default());
        let meta = state.flag_state("exp").unwrap();
        assert!(meta.track_events);
        assert!(meta.track_reason);
        assert!(meta.reason.is_some());
    }

    #[test]
    fn test_failed_prerequisite_does_not_abort_snapshot() {
        let mut dependent = bool_flag("dependent", 1);
        dependent.prerequisites = vec![crate::model::Prerequisite {
            key: "missing".to_string(),
            variation: 0,
        }];
        let store = store_with(vec![dependent, bool_flag("healthy", 1)]);
        let state = FeatureFlagsState::build(
            &store,
            &User::with_key("u"),
            FlagsStateOptions {
                with_reasons: true,
                ..FlagsStateOptions::default()
            },
        );
        assert_eq!(state.len(), 2);
        assert_eq!(state.value("dependent"), Some(&Value::Bool(false)));
        assert_eq!(
            state.flag_state("dependent").unwrap().reason,
            Some(Reason::PrerequisiteFailed {
                prerequisite_key: "missing".to_string()
            })
        );
        assert_eq!(state.value("healthy"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_json_envelope_round_trip() {
        let mut flag = bool_flag("f1", 3);
        flag.track_events = true;
        let store = store_with(vec![flag]);
        let state = FeatureFlagsState::build(
            &store,
            &User::with_key("u"),
            FlagsStateOptions {
                with_reasons: true,
                ..FlagsStateOptions::default()
            },
        );

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["f1"], serde_json::Value::Bool(true));
        assert_eq!(json["$valid"], serde_json::Value::Bool(true));
        assert_eq!(json["$flagsState"]["f1"]["variation"], 0);
        assert_eq!(json["$flagsState"]["f1"]["version"], 3);

        let back: FeatureFlagsState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
