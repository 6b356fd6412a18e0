//! Event names pushed to the websocket group of a job.
//!
//! The browser client dispatches on these names, so they are part of the
//! wire contract and must not change.

/// Job lifecycle status update (`ACCEPTED`, `BUSY`, ...).
pub const EVENT_STATUS: &str = "status";

/// A result archive is ready for download.
pub const EVENT_RESULT: &str = "result";

/// The worker opened an interaction and waits for the browser.
pub const EVENT_INTERACTION_START: &str = "interaction-start";

/// An interaction was answered and the worker resumed.
pub const EVENT_INTERACTION_FINISH: &str = "interaction-finish";

/// A message-log line relayed from the worker process.
pub const EVENT_MESSAGE_LOG: &str = "message-log";
