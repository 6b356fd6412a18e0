//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`JobEvent`]s.
//! The dispatcher and the interaction manager publish; the websocket
//! router subscribes and fans each event out to the job's connection group.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::Utc;
use jobfront_core::job_events::{
    EVENT_INTERACTION_FINISH, EVENT_INTERACTION_START, EVENT_MESSAGE_LOG, EVENT_RESULT,
    EVENT_STATUS,
};
use jobfront_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Job lifecycle status names understood by the browser client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatusEvent {
    Accepted,
    Busy,
    Processing,
    ProcessError,
    Completed,
    Canceled,
}

impl JobStatusEvent {
    /// Whether this status ends a submission's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ProcessError | Self::Completed | Self::Canceled)
    }
}

/// What the browser should display when an interaction starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum InteractionPrompt {
    /// Navigate to a page proxied from the worker's interactive front.
    Page { url: String },
    /// Show inline content, optionally with a script.
    Dialog {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script: Option<String>,
    },
}

/// How an announced interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionOutcome {
    /// The browser answered.
    Finished,
    /// Nobody answered within the interaction timeout.
    TimedOut,
    /// The job's run ended while the interaction was open.
    Canceled,
}

/// An event pushed to every browser watching a job.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Status {
        name: JobStatusEvent,
    },
    Result {
        uuid: uuid::Uuid,
        filename: String,
    },
    InteractionStart {
        interaction_id: String,
        prompt: InteractionPrompt,
    },
    InteractionFinish {
        interaction_id: String,
        outcome: InteractionOutcome,
    },
    MessageLog {
        content: String,
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        header: Option<String>,
    },
}

impl ClientEvent {
    pub fn status(name: JobStatusEvent) -> Self {
        Self::Status { name }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => EVENT_STATUS,
            Self::Result { .. } => EVENT_RESULT,
            Self::InteractionStart { .. } => EVENT_INTERACTION_START,
            Self::InteractionFinish { .. } => EVENT_INTERACTION_FINISH,
            Self::MessageLog { .. } => EVENT_MESSAGE_LOG,
        }
    }

    /// The status carried by this event, if it is a status event.
    pub fn as_status(&self) -> Option<JobStatusEvent> {
        match self {
            Self::Status { name } => Some(*name),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A [`ClientEvent`] addressed to the connection group of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub event: ClientEvent,
    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn new(job_id: impl Into<JobId>, event: ClientEvent) -> Self {
        Self {
            job_id: job_id.into(),
            event,
            timestamp: Utc::now(),
        }
    }

    /// Render the websocket frame: the tagged event plus `job_id` and
    /// `timestamp` fields.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        let mut frame = serde_json::to_value(&self.event)?;
        if let serde_json::Value::Object(map) = &mut frame {
            map.insert("job_id".into(), self.job_id.clone().into());
            map.insert("timestamp".into(), self.timestamp.to_rfc3339().into());
        }
        serde_json::to_string(&frame)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`].
///
/// # Usage
///
/// ```rust
/// use jobfront_events::bus::{ClientEvent, EventBus, JobEvent, JobStatusEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(JobEvent::new("job-1", ClientEvent::status(JobStatusEvent::Accepted)));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        tracing::debug!(job_id = %event.job_id, event = event.event.name(), "Publishing job event");
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Shorthand for publishing a status event.
    pub fn publish_status(&self, job_id: &str, status: JobStatusEvent) {
        self.publish(JobEvent::new(job_id, ClientEvent::status(status)));
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
