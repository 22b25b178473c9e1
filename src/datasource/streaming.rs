//! Streaming data source
//!
//! A single tokio task owns the SSE connection and applies every message to
//! the data store, which serializes `put`/`patch`/`delete` ordering without
//! any global locking. Connection failures are classified: unrecoverable HTTP
//! errors (401, 403, and other non-retryable client errors) stop the source
//! permanently, everything else reconnects with capped exponential backoff
//! and jitter. A restart never clears initialization; stale data keeps
//! serving evaluations while reconnecting.

use super::messages::{item_from_patch, parse_path, DeleteMessage, PatchMessage, PutMessage};
use super::{DataSource, DataSourceResult, DataSourceState, DataSourceStatus};
use crate::store::{DataStore, ItemDescriptor};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use parking_lot::RwLock;
use rand::Rng;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Streaming connection configuration
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Base URI of the streaming endpoint; the source connects to `/all`
    pub base_uri: String,

    /// SDK key sent in the Authorization header
    pub sdk_key: String,

    /// Delay before the first reconnect attempt
    pub initial_reconnect_delay: Duration,

    /// Upper bound on the reconnect delay
    pub max_reconnect_delay: Duration,

    /// Growth factor applied per consecutive failed attempt
    pub backoff_multiplier: f64,

    /// Fraction of the delay randomized away to avoid reconnect stampedes
    pub jitter_ratio: f64,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Maximum quiet time on an established stream before the connection is
    /// treated as stalled and re-established
    pub read_timeout: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            base_uri: "https://stream.flagship.example".to_string(),
            sdk_key: String::new(),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.5,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
        }
    }
}

// State shared between the handle and the consumer task.
struct StreamContext {
    config: StreamingConfig,
    store: Arc<dyn DataStore>,
    initialized: AtomicBool,
    init_notify: Notify,
    status: RwLock<DataSourceStatus>,
}

impl StreamContext {
    fn set_status(&self, state: DataSourceState, last_error: Option<String>) {
        *self.status.write() = DataSourceStatus { state, last_error };
    }
}

// How one connection attempt ended.
enum StreamOutcome {
    Shutdown,
    Unrecoverable(String),
    Recoverable { error: String, connected: bool },
}

/// SSE consumer that keeps a data store in sync with the control plane
pub struct StreamingDataSource {
    context: Arc<StreamContext>,
    shutdown: watch::Sender<bool>,
}

impl StreamingDataSource {
    /// Create a source that writes into the given store
    pub fn new(config: StreamingConfig, store: Arc<dyn DataStore>) -> Self {
        let (shutdown, _) = watch::channel(false);
        StreamingDataSource {
            context: Arc::new(StreamContext {
                config,
                store,
                initialized: AtomicBool::new(false),
                init_notify: Notify::new(),
                status: RwLock::new(DataSourceStatus::default()),
            }),
            shutdown,
        }
    }

    async fn run(context: Arc<StreamContext>, mut shutdown: watch::Receiver<bool>) {
        let client = match reqwest::Client::builder()
            .connect_timeout(context.config.connect_timeout)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                error!(error = %err, "could not build streaming HTTP client");
                context.set_status(DataSourceState::Off, Some(err.to_string()));
                return;
            }
        };

        let mut attempt: u32 = 0;
        while !*shutdown.borrow() {
            match Self::consume_stream(&context, &client, &mut shutdown).await {
                StreamOutcome::Shutdown => break,
                StreamOutcome::Unrecoverable(err) => {
                    error!(error = %err, "permanent streaming failure, giving up");
                    context.set_status(DataSourceState::Off, Some(err));
                    return;
                }
                StreamOutcome::Recoverable { error: err, connected } => {
                    if connected {
                        attempt = 0;
                    }
                    attempt += 1;
                    let delay = backoff_delay(&context.config, attempt);
                    warn!(error = %err, attempt, ?delay, "stream interrupted, reconnecting");
                    context.set_status(DataSourceState::Interrupted, Some(err));
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = shutdown.changed() => {
                            // A dropped handle counts as shutdown
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        context.set_status(DataSourceState::Off, None);
        debug!("streaming data source stopped");
    }

    async fn consume_stream(
        context: &StreamContext,
        client: &reqwest::Client,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamOutcome {
        let url = format!("{}/all", context.config.base_uri.trim_end_matches('/'));
        let response = match client
            .get(&url)
            .header("Authorization", &context.config.sdk_key)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return StreamOutcome::Recoverable {
                    error: err.to_string(),
                    connected: false,
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            if http_error_recoverable(status) {
                return StreamOutcome::Recoverable {
                    error: format!("unexpected HTTP status {status}"),
                    connected: false,
                };
            }
            return StreamOutcome::Unrecoverable(format!(
                "unrecoverable HTTP status {status}"
            ));
        }
        info!(%url, "event stream connected");

        // reqwest has no per-read timeout and a whole-request timeout would
        // kill a healthy long-lived stream, so stall detection wraps each
        // read instead.
        let mut events = Box::pin(response.bytes_stream().eventsource());
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return StreamOutcome::Shutdown;
                    }
                }
                event = tokio::time::timeout(context.config.read_timeout, events.next()) => match event {
                    Err(_) => {
                        return StreamOutcome::Recoverable {
                            error: format!(
                                "no data received within {:?}",
                                context.config.read_timeout
                            ),
                            connected: true,
                        }
                    }
                    Ok(None) => {
                        return StreamOutcome::Recoverable {
                            error: "event stream closed by server".to_string(),
                            connected: true,
                        }
                    }
                    Ok(Some(Err(err))) => {
                        return StreamOutcome::Recoverable {
                            error: err.to_string(),
                            connected: true,
                        }
                    }
                    Ok(Some(Ok(event))) => {
                        if let Err(err) = process_message(context, &event.event, &event.data) {
                            return StreamOutcome::Recoverable {
                                error: err.to_string(),
                                connected: true,
                            };
                        }
                    }
                },
            }
        }
    }
}

#[async_trait]
impl DataSource for StreamingDataSource {
    fn start(&self) -> JoinHandle<()> {
        let context = self.context.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(Self::run(context, shutdown))
    }

    fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    fn initialized(&self) -> bool {
        self.context.initialized.load(Ordering::SeqCst)
    }

    async fn wait_for_initialization(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            // Arm the notification before re-checking the flag, so a put
            // landing in between is not missed.
            let notified = self.context.init_notify.notified();
            if self.initialized() {
                return true;
            }
            tokio::select! {
                _ = notified => {}
                _ = &mut deadline => return self.initialized(),
            }
        }
    }

    fn status(&self) -> DataSourceStatus {
        self.context.status.read().clone()
    }
}

// Applies one stream message to the store. An envelope that does not parse is
// an error (the stream restarts); an unrecognized path or undecodable item
// inside a well-formed patch is logged and skipped.
fn process_message(context: &StreamContext, event: &str, data: &str) -> DataSourceResult<()> {
    match event {
        "put" => {
            let message: PutMessage = serde_json::from_str(data)?;
            context.store.init(message.data.into())?;
            context.initialized.store(true, Ordering::SeqCst);
            context.init_notify.notify_waiters();
            context.set_status(DataSourceState::Valid, None);
            info!("received full flag data set");
            Ok(())
        }
        "patch" => {
            let message: PatchMessage = serde_json::from_str(data)?;
            let Some((kind, key)) = parse_path(&message.path) else {
                warn!(path = %message.path, "ignoring patch for unrecognized path");
                return Ok(());
            };
            match item_from_patch(kind, message.data) {
                Ok(item) => {
                    debug!(%kind, key, version = item.version, "applying patch");
                    context.store.upsert(kind, key, item)?;
                    Ok(())
                }
                Err(err) => {
                    warn!(error = %err, key, "skipping undecodable patch item");
                    Ok(())
                }
            }
        }
        "delete" => {
            let message: DeleteMessage = serde_json::from_str(data)?;
            let Some((kind, key)) = parse_path(&message.path) else {
                warn!(path = %message.path, "ignoring delete for unrecognized path");
                return Ok(());
            };
            debug!(%kind, key, version = message.version, "applying delete");
            context
                .store
                .upsert(kind, key, ItemDescriptor::tombstone(message.version))?;
            Ok(())
        }
        other => {
            debug!(event = other, "ignoring unrecognized stream event");
            Ok(())
        }
    }
}

// Server errors and rate limiting are worth retrying; any other client error
// (401, 403, 404, ...) will not fix itself and stops the source permanently.
fn http_error_recoverable(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
}

fn backoff_delay(config: &StreamingConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16) as i32;
    let base =
        config.initial_reconnect_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let capped = base.min(config.max_reconnect_delay.as_secs_f64());
    let jittered = capped * (1.0 - config.jitter_ratio * rand::thread_rng().gen::<f64>());
    Duration::from_secs_f64(jittered)
}
