//! Job event bus and websocket group membership.
//!
//! - [`EventBus`] - in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying [`JobEvent`]s.
//! - [`ClientEvent`] - the event vocabulary pushed to a job's browsers.
//! - [`GroupBroadcaster`] - job-id → connection-set membership table.

pub mod bus;
pub mod groups;

pub use bus::{
    ClientEvent, EventBus, InteractionOutcome, InteractionPrompt, JobEvent, JobStatusEvent,
};
pub use groups::GroupBroadcaster;
