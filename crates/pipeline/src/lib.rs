//! Job dispatch and interactive rendezvous.
//!
//! - [`JobQueue`] admits submissions, runs them one at a time against the
//!   external worker, handles cancellation and archives results.
//! - [`InteractionManager`] lets a running worker block on input from the
//!   browser that owns the job.
//!
//! Both publish their client-visible events on the shared
//! [`EventBus`](jobfront_events::EventBus).

pub mod config;
pub mod front;
pub mod interaction;
pub mod queue;
pub mod request;

pub use config::PipelineConfig;
pub use front::{FrontContent, FrontError, HttpFront, InteractiveFront};
pub use interaction::{
    InteractionError, InteractionKey, InteractionManager, InteractionMode, InteractionRequest,
};
pub use queue::{Admission, JobQueue};
pub use request::Request;
