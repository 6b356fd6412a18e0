//! Job queue and dispatcher.
//!
//! [`JobQueue::submit`] admits a job and pushes a [`Request`] onto a FIFO
//! drained by a single long-lived Tokio task, so at most one worker process
//! runs per queue. Each request goes through
//!
//! ```text
//! PROCESSING → stage → spawn → wait → archive → result + COMPLETED
//!                                 ↘ PROCESS_ERROR
//! ```
//!
//! and is always cleaned up afterwards (staging removed, interactions of the
//! job cleared).
//!
//! # Status ordering
//!
//! Every status event is published while the queue state lock is held, and
//! terminal statuses are only published for requests still marked active.
//! `cancel` flips the flag under the same lock, so a `CANCELED` is never
//! followed by a `COMPLETED` or `PROCESS_ERROR` for that submission.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use jobfront_core::job::{Job, JobStatus};
use jobfront_core::store::JobStore;
use jobfront_core::types::JobId;
use jobfront_events::{ClientEvent, EventBus, JobEvent, JobStatusEvent};
use jobfront_worker::{
    ArchiveError, ArchivedResult, ProcessSupervisor, ResultArchiver, WorkerCommand, WorkerError,
    WorkerExit,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::interaction::InteractionManager;
use crate::request::Request;

/// How long [`JobQueue::shutdown`] waits for the loop to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Outcome of [`JobQueue::submit`]. Rejection is a normal outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    Accepted,
    Busy,
}

/// Why a processed request did not complete.
#[derive(Debug, thiserror::Error)]
enum JobFailure {
    #[error("staging failed: {0}")]
    Staging(#[source] std::io::Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("worker {0}")]
    Exit(WorkerExit),

    #[error("archiving failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("canceled")]
    Canceled,
}

#[derive(Default)]
struct QueueState {
    /// Queued and processing requests by job.
    active: HashMap<JobId, Arc<Request>>,
}

/// Sequential job dispatcher. Shared as `Arc<JobQueue>`.
pub struct JobQueue {
    config: PipelineConfig,
    store: Arc<dyn JobStore>,
    supervisor: Arc<dyn ProcessSupervisor>,
    interactions: Arc<InteractionManager>,
    event_bus: Arc<EventBus>,
    archiver: ResultArchiver,
    state: tokio::sync::Mutex<QueueState>,
    sender: mpsc::UnboundedSender<Arc<Request>>,
    results: Mutex<HashMap<Uuid, PathBuf>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create the queue and spawn its consumer loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: PipelineConfig,
        store: Arc<dyn JobStore>,
        supervisor: Arc<dyn ProcessSupervisor>,
        interactions: Arc<InteractionManager>,
        event_bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            config,
            store,
            supervisor,
            interactions,
            event_bus,
            archiver: ResultArchiver::new(),
            state: tokio::sync::Mutex::new(QueueState::default()),
            sender,
            results: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        });

        let handle = tokio::spawn(Arc::clone(&queue).run(receiver));
        *queue
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        queue
    }

    /// Admit a job.
    ///
    /// Publishes `BUSY` and returns [`Admission::Busy`] when the queue is
    /// full. A resubmission of an active job supersedes the previous one,
    /// which is canceled first and does not count against the limit.
    pub async fn submit(&self, job: &Job) -> Admission {
        let locations = self.store.locations(job);
        let request = Arc::new(Request::new(
            job.id.clone(),
            locations,
            &self.config.staging_root,
        ));

        let mut state = self.state.lock().await;
        let previous = state.active.get(&job.id).cloned();
        if previous.is_none() && state.active.len() >= self.config.max_queue {
            tracing::info!(job_id = %job.id, max_queue = self.config.max_queue, "Queue full, job rejected");
            self.event_bus.publish_status(&job.id, JobStatusEvent::Busy);
            return Admission::Busy;
        }

        if let Some(previous) = previous {
            if previous.deactivate() {
                tracing::info!(job_id = %job.id, submission = %previous.submission(), "Superseded by resubmission");
                self.event_bus.publish_status(&job.id, JobStatusEvent::Canceled);
            }
            state.active.remove(&job.id);
        }

        if self.sender.send(Arc::clone(&request)).is_err() {
            tracing::warn!(job_id = %job.id, "Dispatcher stopped, job rejected");
            self.event_bus.publish_status(&job.id, JobStatusEvent::Busy);
            return Admission::Busy;
        }
        tracing::info!(job_id = %job.id, submission = %request.submission(), "Job accepted");
        state.active.insert(job.id.clone(), request);
        self.event_bus.publish_status(&job.id, JobStatusEvent::Accepted);
        Admission::Accepted
    }

    /// Cancel the active submission of a job.
    ///
    /// Returns `false`, without publishing anything, if the job is not
    /// active. A running worker is sent a termination signal.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(request) = state.active.remove(job_id) else {
            return false;
        };
        if !request.deactivate() {
            return false;
        }
        tracing::info!(
            job_id,
            submission = %request.submission(),
            running = request.has_process(),
            "Job canceled",
        );
        self.event_bus.publish_status(job_id, JobStatusEvent::Canceled);
        true
    }

    pub async fn is_active(&self, job_id: &str) -> bool {
        self.state
            .lock()
            .await
            .active
            .get(job_id)
            .is_some_and(|r| r.is_active())
    }

    /// Number of queued plus processing jobs.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Path of a result archive announced by a `result` event.
    pub fn result(&self, id: &Uuid) -> Option<PathBuf> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Cancel every active job and stop the consumer loop.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            for (job_id, request) in state.active.drain() {
                if request.deactivate() {
                    self.event_bus.publish_status(&job_id, JobStatusEvent::Canceled);
                }
            }
        }
        self.cancel.cancel();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("Job dispatcher did not stop in time");
            }
        }
    }

    // ---- consumer loop ----

    async fn run(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<Arc<Request>>) {
        tracing::info!(max_queue = self.config.max_queue, "Job dispatcher started");
        loop {
            let request = tokio::select! {
                () = self.cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };
            self.process(&request).await;
        }
        tracing::info!("Job dispatcher shutting down");
    }

    async fn process(&self, request: &Arc<Request>) {
        let job_id = request.job_id();
        {
            let _state = self.state.lock().await;
            if !request.is_active() {
                tracing::debug!(job_id, submission = %request.submission(), "Skipping canceled request");
                return;
            }
            self.event_bus.publish_status(job_id, JobStatusEvent::Processing);
        }
        self.mark(job_id, JobStatus::Processing);

        let outcome = self.execute(request).await;
        self.finalize(request, outcome).await;
        self.cleanup(request).await;
    }

    async fn execute(&self, request: &Request) -> Result<ArchivedResult, JobFailure> {
        let staged = request.stage().await.map_err(JobFailure::Staging)?;
        let command = WorkerCommand {
            program: self.config.worker_program.clone(),
            input: staged.input,
            output: staged.output.clone(),
            job_id: request.job_id().to_string(),
            callback: self.config.callback_address.clone(),
            stand_alone: self.config.stand_alone,
            package: staged.package,
        };

        let process = self.supervisor.spawn(&command)?;
        request.attach(process.kill_switch());
        let exit = process.wait().await;
        request.detach();
        let exit = exit?;

        if !request.is_active() {
            return Err(JobFailure::Canceled);
        }
        if !exit.success() {
            return Err(JobFailure::Exit(exit));
        }

        Ok(self
            .archiver
            .archive(request.job_id(), &staged.output, &request.locations().results)
            .await?)
    }

    async fn finalize(&self, request: &Arc<Request>, outcome: Result<ArchivedResult, JobFailure>) {
        let job_id = request.job_id();
        let mut state = self.state.lock().await;
        if !request.is_active() {
            // CANCELED has been published by whoever deactivated it.
            tracing::info!(job_id, submission = %request.submission(), "Job ended after cancellation");
            return;
        }
        if state
            .active
            .get(job_id)
            .is_some_and(|r| Arc::ptr_eq(r, request))
        {
            state.active.remove(job_id);
        }

        match outcome {
            Ok(archived) => {
                let id = Uuid::new_v4();
                self.results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, archived.path.clone());
                self.event_bus.publish(JobEvent::new(
                    job_id,
                    ClientEvent::Result {
                        uuid: id,
                        filename: archived.filename,
                    },
                ));
                self.event_bus.publish_status(job_id, JobStatusEvent::Completed);
                tracing::info!(job_id, result = %id, "Job completed");
            }
            Err(JobFailure::Canceled) => {}
            Err(failure) => {
                tracing::error!(job_id, error = %failure, "Job processing failed");
                self.event_bus.publish_status(job_id, JobStatusEvent::ProcessError);
            }
        }
    }

    /// Runs after every processed request, whatever the outcome.
    async fn cleanup(&self, request: &Arc<Request>) {
        let job_id = request.job_id();
        request.detach();
        if let Err(e) = request.remove_staging().await {
            tracing::warn!(job_id, error = %e, "Failed to remove staging directory");
        }
        self.interactions.clear_job(job_id);
        {
            let mut state = self.state.lock().await;
            if state
                .active
                .get(job_id)
                .is_some_and(|r| Arc::ptr_eq(r, request))
            {
                state.active.remove(job_id);
            }
        }
        self.mark(job_id, JobStatus::Processable);
    }

    /// Best-effort update of the persisted job status.
    fn mark(&self, job_id: &str, status: JobStatus) {
        let result = self.store.find_job(job_id).and_then(|job| match job {
            Some(mut job) => {
                job.status = status;
                self.store.save(&mut job)
            }
            None => Ok(()),
        });
        if let Err(e) = result {
            tracing::warn!(job_id, error = %e, "Failed to update job status");
        }
    }
}
