pub mod interactions;
pub mod jobs;
