use std::path::PathBuf;
use std::time::Duration;

/// Dispatcher and interaction settings loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of queued plus processing jobs (default: `5`).
    pub max_queue: usize,
    /// Worker executable (default: `pione-client`).
    pub worker_program: String,
    /// Pass `--stand-alone` to the worker (default: `false`).
    pub stand_alone: bool,
    /// Directory holding per-submission staging directories.
    pub staging_root: PathBuf,
    /// Root of the job workspace read by the job store.
    pub workspace_root: PathBuf,
    /// Address the worker calls back into for interactions.
    pub callback_address: String,
    /// Give up on an unanswered interaction after this long; `None` waits
    /// forever.
    pub interaction_timeout: Option<Duration>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                           |
    /// |----------------------------|-----------------------------------|
    /// | `JOB_QUEUE_MAX`            | `5`                               |
    /// | `WORKER_PROGRAM`           | `pione-client`                    |
    /// | `STAND_ALONE`              | `false`                           |
    /// | `STAGING_ROOT`             | `<tmp>/jobfront-staging`          |
    /// | `WORKSPACE_ROOT`           | `./workspace`                     |
    /// | `CALLBACK_ADDRESS`         | `default_callback`                |
    /// | `INTERACTION_TIMEOUT_SECS` | unset (wait forever)              |
    pub fn from_env(default_callback: &str) -> Self {
        let max_queue: usize = std::env::var("JOB_QUEUE_MAX")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("JOB_QUEUE_MAX must be a valid usize");

        let worker_program =
            std::env::var("WORKER_PROGRAM").unwrap_or_else(|_| "pione-client".into());

        let stand_alone = std::env::var("STAND_ALONE")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let staging_root = std::env::var("STAGING_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("jobfront-staging"));

        let workspace_root = std::env::var("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./workspace"));

        let callback_address =
            std::env::var("CALLBACK_ADDRESS").unwrap_or_else(|_| default_callback.to_string());

        let interaction_timeout = std::env::var("INTERACTION_TIMEOUT_SECS").ok().map(|v| {
            Duration::from_secs(
                v.parse()
                    .expect("INTERACTION_TIMEOUT_SECS must be a valid u64"),
            )
        });

        Self {
            max_queue,
            worker_program,
            stand_alone,
            staging_root,
            workspace_root,
            callback_address,
            interaction_timeout,
        }
    }
}
