//! Delivery of job events to browser connections.

pub mod router;

pub use router::GroupRouter;
