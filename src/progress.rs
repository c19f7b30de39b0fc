//! Per-session progress broadcasting and cooperative cancellation.
//!
//! One session tracks one pipeline run. The channel fans events out to
//! subscribers best-effort (a failing or slow subscriber is dropped, never
//! surfaced to the pipeline), keeps `current` monotone non-decreasing, and
//! coalesces immaterial updates unless an event is forced.
//!
//! Cancellation is an explicit [`CancelHandle`] created when the session is
//! opened and passed by the caller into the run; the orchestrator polls it
//! only at batch boundaries, so an in-flight gateway call always completes
//! before a stop takes effect.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TriageError};
use crate::traits::subscriber::ProgressSubscriber;

/// Progress change (in percentage points) below which a non-forced event
/// is coalesced.
const MATERIALITY_PERCENT: f64 = 5.0;

/// An event published for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A run started.
    Started {
        total: u64,
        label: String,
        timestamp: DateTime<Utc>,
    },

    /// Work advanced. `current` never regresses within a session.
    Progress {
        current: u64,
        total: u64,
        percentage: f64,
        label: String,
        timestamp: DateTime<Utc>,
    },

    /// The run ended early at a cancellation checkpoint.
    Stopped {
        current: u64,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run finished; `summary` carries the serialized stats.
    Completed {
        summary: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// The run failed fatally.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// A `Started` event stamped now.
    pub fn started(total: u64, label: impl Into<String>) -> Self {
        Self::Started {
            total,
            label: label.into(),
            timestamp: Utc::now(),
        }
    }

    /// A `Progress` event stamped now. Percentage is filled in by the
    /// channel at publish time.
    pub fn progress(current: u64, total: u64, label: impl Into<String>) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self::Progress {
            current,
            total,
            percentage,
            label: label.into(),
            timestamp: Utc::now(),
        }
    }

    /// A `Stopped` event stamped now.
    pub fn stopped(current: u64, total: u64) -> Self {
        Self::Stopped {
            current,
            total,
            timestamp: Utc::now(),
        }
    }

    /// A `Completed` event stamped now.
    pub fn completed(summary: serde_json::Value) -> Self {
        Self::Completed {
            summary,
            timestamp: Utc::now(),
        }
    }

    /// An `Error` event stamped now.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Cancellation handle for one run.
///
/// Cloneable; one clone goes to the running pipeline (reader), any others
/// to whoever may request a stop (writer). Backed by an atomic token, so
/// no further locking is needed at the checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a standalone handle (for runs without a channel session).
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Observed at the next batch boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct SessionState {
    total: u64,
    current: u64,
    last_published_percent: Option<f64>,
    cancel: CancelHandle,
    subscribers: Vec<Box<dyn ProgressSubscriber>>,
}

/// Publish/subscribe broadcaster keyed by session id.
pub struct ProgressChannel {
    sessions: RwLock<HashMap<String, SessionState>>,
    delivery_timeout: Duration,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    /// Create a channel with a 5 second per-subscriber delivery timeout.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            delivery_timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-subscriber delivery timeout.
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Open a session and return its cancellation handle.
    ///
    /// Fails if the id is already active: a session must never be owned by
    /// two concurrent runs.
    pub async fn open_session(&self, session_id: &str, total: u64) -> Result<CancelHandle> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(TriageError::validation(format!(
                "session already active: {session_id}"
            )));
        }

        let handle = CancelHandle::new();
        sessions.insert(
            session_id.to_string(),
            SessionState {
                total,
                current: 0,
                last_published_percent: None,
                cancel: handle.clone(),
                subscribers: Vec::new(),
            },
        );
        info!(session_id, total, "session opened");
        Ok(handle)
    }

    /// Attach a subscriber to a session. Returns false when the session
    /// does not exist.
    pub async fn subscribe(
        &self,
        session_id: &str,
        subscriber: Box<dyn ProgressSubscriber>,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(state) => {
                state.subscribers.push(subscriber);
                true
            }
            None => {
                warn!(session_id, "subscribe to unknown session");
                false
            }
        }
    }

    /// Request a cooperative stop. Returns false when the session does not
    /// exist.
    pub async fn request_stop(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(state) => {
                info!(session_id, "stop requested");
                state.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a session is currently open.
    pub async fn is_active(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Remove a session and its subscribers.
    pub async fn close_session(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            debug!(session_id, "session closed");
        }
    }

    /// Publish an event to a session's subscribers.
    ///
    /// `Progress` events are clamped so `current` never regresses, and
    /// non-forced events under the materiality threshold are dropped.
    /// Delivery failures remove the subscriber; nothing propagates to the
    /// caller.
    pub async fn publish(&self, session_id: &str, event: ProgressEvent, force: bool) {
        let (event, mut subscribers) = {
            let mut sessions = self.sessions.write().await;
            let Some(state) = sessions.get_mut(session_id) else {
                return;
            };

            let event = match event {
                ProgressEvent::Progress {
                    current,
                    label,
                    timestamp,
                    ..
                } => {
                    // Monotone per session regardless of what the caller reports.
                    state.current = state.current.max(current);
                    let percentage = if state.total > 0 {
                        (state.current as f64 / state.total as f64 * 1000.0).round() / 10.0
                    } else {
                        0.0
                    };

                    if !force {
                        let delta = state
                            .last_published_percent
                            .map(|last| percentage - last)
                            .unwrap_or(f64::INFINITY);
                        if delta < MATERIALITY_PERCENT {
                            debug!(session_id, percentage, "progress event coalesced");
                            return;
                        }
                    }
                    state.last_published_percent = Some(percentage);

                    ProgressEvent::Progress {
                        current: state.current,
                        total: state.total,
                        percentage,
                        label,
                        timestamp,
                    }
                }
                other => other,
            };

            if state.subscribers.is_empty() {
                return;
            }
            // Deliver outside the lock; only the owning run publishes to a
            // session, so taking the subscriber set is race-free.
            (event, std::mem::take(&mut state.subscribers))
        };

        let mut retained = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers.drain(..) {
            let delivered = tokio::time::timeout(
                self.delivery_timeout,
                subscriber.on_event(session_id, &event),
            )
            .await;

            match delivered {
                Ok(Ok(())) => retained.push(subscriber),
                Ok(Err(err)) => {
                    warn!(session_id, error = %err, "subscriber delivery failed, dropping");
                }
                Err(_) => {
                    warn!(session_id, "subscriber delivery timed out, dropping");
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(state) = sessions.get_mut(session_id) {
            // Subscribers added during delivery stay behind the retained set.
            retained.append(&mut state.subscribers);
            state.subscribers = retained;
        }
    }
}
