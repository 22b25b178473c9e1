//! # FLAGSHIP - Server-Side Feature Flag Evaluation SDK
//!
//! The server-side runtime of a feature-flag evaluation SDK. A host
//! application embeds it to ask "what value does flag F have for user U?"
//! and receives a variation plus a structured reason, computed locally and
//! synchronously against a continuously-refreshed ruleset delivered over a
//! long-lived streaming connection.
//!
//! ## Architecture
//!
//! - `model`: Values, users, flags, and segments as delivered by the control plane
//! - `store`: Versioned data stores - in-memory, and cached over a persistent core
//! - `eval`: The pure evaluation engine, operators, bucketing, and reasons
//! - `datasource`: The streaming consumer that keeps the store in sync

#![warn(missing_docs)]
#![warn(clippy::all)]

// Data model - values, users, flags, segments
pub mod model;

// Data stores and the persistent-store cache wrapper
pub mod store;

// Evaluation engine
pub mod eval;

// Streaming data source
pub mod datasource;

// Re-export commonly used types
pub use datasource::{
    DataSource, DataSourceState, DataSourceStatus, StreamingConfig, StreamingDataSource,
};
pub use eval::{
    evaluate, Detail, ErrorKind, EvalResult, Evaluator, FeatureFlagsState, FlagsStateOptions,
    PrerequisiteEvent, Reason, StoreDataReader,
};
pub use model::{Flag, Segment, User, UserBuilder, Value};
pub use store::{
    CacheConfig, CacheMode, DataKind, DataStore, FullDataSet, InMemoryDataStore, ItemDescriptor,
    PersistentStoreCore, PersistentStoreWrapper, StoreItem,
};

/// Re-export version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
