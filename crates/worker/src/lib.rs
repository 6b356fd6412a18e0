//! External worker process management.
//!
//! Spawns the processing engine with its stable argument vector, supervises
//! it until exit, and packages its output directory into a result archive.
//! Nothing here knows about queues or browsers; the dispatcher in the
//! pipeline crate drives these pieces.

pub mod archive;
pub mod command;
pub mod process_log;
pub mod supervisor;

pub use archive::{ArchiveError, ArchivedResult, ResultArchiver};
pub use command::WorkerCommand;
pub use supervisor::{
    KillSwitch, ProcessSupervisor, TokioSupervisor, WorkerError, WorkerExit, WorkerProcess,
};
