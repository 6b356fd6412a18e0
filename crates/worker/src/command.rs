//! Worker argument vector.
//!
//! This is the coupling surface to the external engine:
//!
//! ```text
//! <program> [--input <dir>] --output <dir> --job-id <id> --callback <address> [--stand-alone] <package>
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

/// Everything needed to launch one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable name or path.
    pub program: String,
    /// Staged input directory, omitted when the job has no inputs.
    pub input: Option<PathBuf>,
    /// Directory the worker writes its results and process log into.
    pub output: PathBuf,
    pub job_id: String,
    /// Base address of the interaction callback API.
    pub callback: String,
    pub stand_alone: bool,
    /// Staged package file, passed as the trailing positional argument.
    pub package: PathBuf,
}

impl WorkerCommand {
    /// Build the argument vector (without the program name).
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(10);
        if let Some(input) = &self.input {
            args.push("--input".into());
            args.push(input.into());
        }
        args.push("--output".into());
        args.push((&self.output).into());
        args.push("--job-id".into());
        args.push((&self.job_id).into());
        args.push("--callback".into());
        args.push((&self.callback).into());
        if self.stand_alone {
            args.push("--stand-alone".into());
        }
        args.push((&self.package).into());
        args
    }
}
