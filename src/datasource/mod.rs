//! Data source layer
//!
//! The data source keeps the data store in sync with the control plane. The
//! shipped implementation is [`StreamingDataSource`], a single-consumer loop
//! over a server-sent-event channel that translates `put`/`patch`/`delete`
//! messages into atomic store mutations, tracks initialization, and restarts
//! failed connections with capped exponential backoff and jitter.

use crate::store::StoreError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Data source error types
#[derive(Error, Debug)]
pub enum DataSourceError {
    /// An event payload could not be parsed
    #[error("malformed event payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// The data store rejected an update
    #[error("data store update failed: {0}")]
    Store(#[from] StoreError),

    /// The stream connection failed
    #[error("stream connection failed: {0}")]
    Connection(String),
}

/// Result type for data source operations
pub type DataSourceResult<T> = Result<T, DataSourceError>;

/// Lifecycle state of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceState {
    /// Connecting, no full data set received yet
    Initializing,
    /// Connected and serving fresh data
    Valid,
    /// Connection lost; stale data continues to serve evaluations
    Interrupted,
    /// Stopped, either by the host or by an unrecoverable failure
    Off,
}

/// A point-in-time status snapshot of a data source
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceStatus {
    /// Current lifecycle state
    pub state: DataSourceState,
    /// Most recent error, if any
    pub last_error: Option<String>,
}

impl Default for DataSourceStatus {
    fn default() -> Self {
        DataSourceStatus {
            state: DataSourceState::Initializing,
            last_error: None,
        }
    }
}

/// A component that populates and maintains the data store
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Begin delivering data; returns the handle of the driving task
    fn start(&self) -> JoinHandle<()>;

    /// Signal the source to stop and release its transport
    fn stop(&self);

    /// Whether a full data set has ever been received
    fn initialized(&self) -> bool;

    /// Wait until the first full data set arrives or the timeout elapses;
    /// returns whether the source is initialized
    async fn wait_for_initialization(&self, timeout: Duration) -> bool;

    /// Current status snapshot
    fn status(&self) -> DataSourceStatus;
}

pub mod messages;
pub mod streaming;

// Re-exports for convenience
pub use streaming::{StreamingConfig, StreamingDataSource};
