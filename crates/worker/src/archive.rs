//! Result archiving.
//!
//! After a successful run the worker's output directory is zipped into the
//! job's results directory as `<job-id>-<YYYYmmddHHMMSS>.zip`, with a
//! numeric suffix when that name is already taken. Auxiliary
//! logs are derived first so they land in the archive too; failing to derive
//! them never fails the archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::process_log::derive_filtered_logs;

/// Errors from packaging a result archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("zip encoding failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("output directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("archive task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A finished archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedResult {
    pub path: PathBuf,
    /// File name offered to the browser for download.
    pub filename: String,
}

/// Packages worker output directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultArchiver;

impl ResultArchiver {
    pub fn new() -> Self {
        Self
    }

    /// Zip `output_dir` into `results_dir`.
    ///
    /// Runs on the blocking pool; compression of large outputs would
    /// otherwise stall the runtime.
    pub async fn archive(
        &self,
        job_id: &str,
        output_dir: &Path,
        results_dir: &Path,
    ) -> Result<ArchivedResult, ArchiveError> {
        let job_id = job_id.to_string();
        let output_dir = output_dir.to_path_buf();
        let results_dir = results_dir.to_path_buf();
        tokio::task::spawn_blocking(move || archive_blocking(&job_id, &output_dir, &results_dir))
            .await?
    }
}

/// Deterministic archive name for a job finished at the current time.
pub fn archive_filename(job_id: &str) -> String {
    format!("{job_id}-{}.zip", Utc::now().format("%Y%m%d%H%M%S"))
}

/// Attempts at finding a free archive name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

fn archive_blocking(
    job_id: &str,
    output_dir: &Path,
    results_dir: &Path,
) -> Result<ArchivedResult, ArchiveError> {
    if let Err(e) = derive_filtered_logs(output_dir) {
        tracing::warn!(job_id, error = %e, "Failed to derive auxiliary process logs");
    }

    fs::create_dir_all(results_dir)?;
    let (filename, file) = create_archive_file(job_id, results_dir)?;
    let path = results_dir.join(&filename);

    if let Err(e) = write_zip(file, output_dir) {
        // A truncated archive must not stay in the results directory.
        if let Err(rm) = fs::remove_file(&path) {
            tracing::warn!(job_id, path = %path.display(), error = %rm, "Failed to remove partial archive");
        }
        return Err(e);
    }

    tracing::info!(job_id, path = %path.display(), "Result archive written");
    Ok(ArchivedResult { path, filename })
}

/// Create the archive file under a name no earlier run has taken.
///
/// Runs finishing within the same second get a numeric suffix:
/// `<job-id>-<ts>.zip`, `<job-id>-<ts>-1.zip`, ...
fn create_archive_file(job_id: &str, results_dir: &Path) -> io::Result<(String, fs::File)> {
    let base = archive_filename(job_id);
    let stem = base.trim_end_matches(".zip");
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let filename = match attempt {
            0 => base.clone(),
            n => format!("{stem}-{n}.zip"),
        };
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(results_dir.join(&filename))
        {
            Ok(file) => return Ok((filename, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free archive name for {base}"),
    ))
}

fn write_zip(file: fs::File, output_dir: &Path) -> Result<(), ArchiveError> {
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(output_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(output_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut file = fs::File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
        }
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::process_log::PROCESS_LOG_FILENAME;

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn filename_is_job_id_plus_timestamp() {
        let name = archive_filename("job-1");
        assert!(name.starts_with("job-1-"));
        assert!(name.ends_with(".zip"));
        // job-1- + 14 digit timestamp + .zip
        assert_eq!(name.len(), "job-1-".len() + 14 + ".zip".len());
    }

    #[tokio::test]
    async fn archive_contains_nested_output() {
        let output = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        fs::write(output.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir_all(output.path().join("sub")).unwrap();
        fs::write(output.path().join("sub").join("b.txt"), "beta").unwrap();

        let archived = ResultArchiver::new()
            .archive("job-1", output.path(), results.path())
            .await
            .unwrap();

        assert!(archived.path.starts_with(results.path()));
        let names = entry_names(&archived.path);
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.iter().any(|n| n.trim_end_matches('/') == "sub"));
        assert!(names.contains(&"sub/b.txt".to_string()));

        let mut archive = zip::ZipArchive::new(fs::File::open(&archived.path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("sub/b.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "beta");
    }

    #[tokio::test]
    async fn derived_logs_are_included() {
        let output = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        fs::write(
            output.path().join(PROCESS_LOG_FILENAME),
            "{\"trace_type\":\"task_process\"}\n",
        )
        .unwrap();

        let archived = ResultArchiver::new()
            .archive("job-2", output.path(), results.path())
            .await
            .unwrap();

        let names = entry_names(&archived.path);
        assert!(names.contains(&"process-task.jsonl".to_string()));
        assert!(names.contains(&PROCESS_LOG_FILENAME.to_string()));
    }

    #[tokio::test]
    async fn missing_output_dir_fails() {
        let results = tempfile::tempdir().unwrap();
        let missing = results.path().join("nope");

        let err = ResultArchiver::new()
            .archive("job-3", &missing, results.path())
            .await;
        assert!(err.is_err());
        // No partial archive is left behind.
        let leftovers: Vec<_> = fs::read_dir(results.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".zip"))
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }

    #[tokio::test]
    async fn runs_in_the_same_second_get_distinct_archives() {
        let output = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        fs::write(output.path().join("a.txt"), "alpha").unwrap();

        // An archive from an earlier run under the name this run would pick.
        let taken = results.path().join(archive_filename("job-4"));
        fs::write(&taken, "earlier").unwrap();

        let archiver = ResultArchiver::new();
        let first = archiver
            .archive("job-4", output.path(), results.path())
            .await
            .unwrap();
        let second = archiver
            .archive("job-4", output.path(), results.path())
            .await
            .unwrap();

        assert_ne!(first.path, taken);
        assert_ne!(second.path, taken);
        assert_ne!(first.path, second.path);
        assert_eq!(fs::read_to_string(&taken).unwrap(), "earlier");
        assert!(first.filename.starts_with("job-4-"));
        assert!(entry_names(&first.path).contains(&"a.txt".to_string()));
        assert!(entry_names(&second.path).contains(&"a.txt".to_string()));
    }
}
