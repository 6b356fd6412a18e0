//! Shared domain types for the job front-end.
//!
//! Holds the job model, the persistence seam the dispatcher reads jobs
//! through, and the event-name vocabulary pushed to browser clients.

pub mod error;
pub mod job;
pub mod job_events;
pub mod store;
pub mod types;
