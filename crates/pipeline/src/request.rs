//! One submission of a job to the dispatcher.
//!
//! A [`Request`] is created by `submit`, flipped inactive by `cancel`, and
//! dropped once the consumer loop is done with it. It owns the submission's
//! staging directory:
//!
//! ```text
//! <staging root>/<job-id>-<submission>/package/<package file>
//! <staging root>/<job-id>-<submission>/input/...
//! <staging root>/<job-id>-<submission>/output/
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use jobfront_core::job::JobLocations;
use jobfront_core::types::JobId;
use jobfront_worker::KillSwitch;
use uuid::Uuid;
use walkdir::WalkDir;

/// Paths handed to the worker after staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPaths {
    pub package: PathBuf,
    pub input: Option<PathBuf>,
    pub output: PathBuf,
}

/// A dispatcher-internal job submission.
#[derive(Debug)]
pub struct Request {
    job_id: JobId,
    submission: Uuid,
    active: AtomicBool,
    /// Kill switch of the running worker, if any.
    process: Mutex<Option<KillSwitch>>,
    locations: JobLocations,
    base: PathBuf,
}

impl Request {
    pub fn new(job_id: impl Into<JobId>, locations: JobLocations, staging_root: &Path) -> Self {
        let job_id = job_id.into();
        let submission = Uuid::new_v4();
        let base = staging_root.join(format!("{job_id}-{submission}"));
        Self {
            job_id,
            submission,
            active: AtomicBool::new(true),
            process: Mutex::new(None),
            locations,
            base,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Unique id of this submission.
    pub fn submission(&self) -> Uuid {
        self.submission
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn locations(&self) -> &JobLocations {
        &self.locations
    }

    /// Staging directory of this submission.
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base.join("output")
    }

    /// Mark the request canceled and terminate its worker if one is running.
    ///
    /// Returns `false` if the request was already inactive.
    pub fn deactivate(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if let Some(kill) = self.process_slot().as_ref() {
            kill.kill();
        }
        was_active
    }

    /// Record the running worker.
    ///
    /// A cancel that raced the spawn finds no kill switch, so an already
    /// inactive request kills the new worker right here.
    pub fn attach(&self, kill: KillSwitch) {
        let mut slot = self.process_slot();
        if !self.is_active() {
            kill.kill();
        }
        *slot = Some(kill);
    }

    /// Forget the worker once it has exited.
    pub fn detach(&self) {
        self.process_slot().take();
    }

    pub fn has_process(&self) -> bool {
        self.process_slot().is_some()
    }

    /// Copy the package file and inputs into the staging directory.
    pub async fn stage(&self) -> io::Result<StagedPaths> {
        let base = self.base.clone();
        let locations = self.locations.clone();
        tokio::task::spawn_blocking(move || stage_blocking(&base, &locations))
            .await
            .map_err(io::Error::other)?
    }

    /// Remove the staging directory. Missing directories are fine.
    pub async fn remove_staging(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.base).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn process_slot(&self) -> std::sync::MutexGuard<'_, Option<KillSwitch>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stage_blocking(base: &Path, locations: &JobLocations) -> io::Result<StagedPaths> {
    let source = locations
        .package
        .as_deref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "job has no package file"))?;
    let name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "package path has no file name"))?;

    let package_dir = base.join("package");
    fs::create_dir_all(&package_dir)?;
    let package = package_dir.join(name);
    fs::copy(source, &package)?;

    let input = match locations.input.as_deref() {
        Some(dir) => {
            let target = base.join("input");
            copy_tree(dir, &target)?;
            Some(target)
        }
        None => None,
    };

    let output = base.join("output");
    fs::create_dir_all(&output)?;

    Ok(StagedPaths {
        package,
        input,
        output,
    })
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
