//! Job model.
//!
//! A [`Job`] is owned by a user and backed by a package file plus optional
//! input files. The dispatcher only needs the job's id and the location
//! triple in [`JobLocations`]; the remaining fields are carried for the
//! persistence layer.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Maximum accepted length of a job identifier.
const MAX_JOB_ID_LEN: usize = 128;

/// Persisted processing status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Unset,
    Init,
    Processable,
    Processing,
}

/// A unit of work submitted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Name of the owning user.
    pub owner: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub ctime: Timestamp,
    pub mtime: Timestamp,
    /// File name of the uploaded package, if one has been uploaded.
    #[serde(default)]
    pub package_filename: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
}

impl Job {
    /// Create a job with a freshly generated id.
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), owner)
    }

    /// Create a job with a caller-chosen id.
    pub fn with_id(id: impl Into<JobId>, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            name: None,
            description: None,
            ctime: now,
            mtime: now,
            package_filename: None,
            status: JobStatus::Unset,
        }
    }

    pub fn with_package(mut self, filename: impl Into<String>) -> Self {
        self.package_filename = Some(filename.into());
        self
    }
}

/// Filesystem locations of a job's package, inputs and results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLocations {
    /// Uploaded package file, `None` if nothing was uploaded yet.
    pub package: Option<PathBuf>,
    /// Input directory, `None` if the job has no inputs.
    pub input: Option<PathBuf>,
    /// Directory receiving result archives.
    pub results: PathBuf,
}

/// Job ids end up in filesystem paths and URLs, so only a conservative
/// character set is accepted: alphanumeric, hyphen, underscore.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_JOB_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
