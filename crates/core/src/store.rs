//! Job persistence seam.
//!
//! The dispatcher and the interaction manager never manage the on-disk
//! layout themselves; they look jobs up through [`JobStore`]. [`FsJobStore`]
//! is the filesystem implementation used by the server binary:
//!
//! ```text
//! <root>/<job-id>/job-info.json
//! <root>/<job-id>/package/<package file>
//! <root>/<job-id>/input/...
//! <root>/<job-id>/results/...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::CoreError;
use crate::job::{is_valid_job_id, Job, JobLocations};

/// File holding the serialized [`Job`] inside its directory.
pub const JOBINFO_FILENAME: &str = "job-info.json";

const PACKAGE_DIR: &str = "package";
const INPUT_DIR: &str = "input";
const RESULTS_DIR: &str = "results";

/// Lookup and persistence of job records.
pub trait JobStore: Send + Sync {
    /// Find a job by id. Returns `Ok(None)` if it does not exist.
    fn find_job(&self, id: &str) -> Result<Option<Job>, CoreError>;

    /// Persist the job, refreshing its modification time.
    fn save(&self, job: &mut Job) -> Result<(), CoreError>;

    /// Remove the job and everything stored under it.
    fn delete(&self, id: &str) -> Result<(), CoreError>;

    /// Resolve the package/input/results locations of a job.
    fn locations(&self, job: &Job) -> JobLocations;
}

/// Filesystem-backed [`JobStore`].
#[derive(Debug, Clone)]
pub struct FsJobStore {
    root: PathBuf,
}

impl FsJobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, id: &str) -> Result<PathBuf, CoreError> {
        if !is_valid_job_id(id) {
            return Err(CoreError::Validation(format!("invalid job id: {id:?}")));
        }
        Ok(self.root.join(id))
    }
}

impl JobStore for FsJobStore {
    fn find_job(&self, id: &str) -> Result<Option<Job>, CoreError> {
        let path = self.job_dir(id)?.join(JOBINFO_FILENAME);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn save(&self, job: &mut Job) -> Result<(), CoreError> {
        let dir = self.job_dir(&job.id)?;
        fs::create_dir_all(&dir)?;
        job.mtime = Utc::now();
        let raw = serde_json::to_vec_pretty(job)?;
        fs::write(dir.join(JOBINFO_FILENAME), raw)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), CoreError> {
        let dir = self.job_dir(id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::NotFound {
                entity: "Job",
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn locations(&self, job: &Job) -> JobLocations {
        let dir = self.root.join(&job.id);
        let input = dir.join(INPUT_DIR);
        JobLocations {
            package: job
                .package_filename
                .as_ref()
                .map(|name| dir.join(PACKAGE_DIR).join(name)),
            input: input.is_dir().then_some(input),
            results: dir.join(RESULTS_DIR),
        }
    }
}
