//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobfront_core::job::Job;
use jobfront_core::store::{FsJobStore, JobStore};
use jobfront_events::{ClientEvent, EventBus, JobEvent, JobStatusEvent};
use jobfront_pipeline::{
    FrontContent, FrontError, InteractionManager, InteractiveFront, JobQueue, PipelineConfig,
};
use jobfront_worker::{
    KillSwitch, ProcessSupervisor, WorkerCommand, WorkerError, WorkerExit, WorkerProcess,
};
use tempfile::TempDir;
use tokio::sync::{broadcast, oneshot};

/// How long tests wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fake supervisor
// ---------------------------------------------------------------------------

/// What a fake worker does once spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// `spawn` itself fails.
    SpawnFail,
    /// Write `result.txt` into the output directory and exit with the code.
    Exit(i32),
    /// Run until the kill switch fires, then report SIGTERM.
    HoldUntilKilled,
}

/// [`ProcessSupervisor`] that never starts a real process.
///
/// Behaviors are queued per job id; jobs without a queued behavior exit 0.
#[derive(Default)]
pub struct FakeSupervisor {
    behaviors: Mutex<HashMap<String, VecDeque<Behavior>>>,
    spawned: Mutex<Vec<WorkerCommand>>,
}

impl FakeSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, job_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back(behavior);
    }

    pub fn spawned(&self) -> Vec<WorkerCommand> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn spawned_for(&self, job_id: &str) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.job_id == job_id)
            .count()
    }
}

impl ProcessSupervisor for FakeSupervisor {
    fn spawn(&self, command: &WorkerCommand) -> Result<WorkerProcess, WorkerError> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get_mut(&command.job_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Behavior::Exit(0));

        if behavior == Behavior::SpawnFail {
            return Err(WorkerError::Spawn {
                program: command.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
            });
        }
        self.spawned.lock().unwrap().push(command.clone());

        let kill = KillSwitch::new();
        let (tx, rx) = oneshot::channel();
        match behavior {
            Behavior::Exit(code) => {
                std::fs::write(command.output.join("result.txt"), "done").unwrap();
                let exit = if code == 0 {
                    WorkerExit::Success
                } else {
                    WorkerExit::Failed { code }
                };
                let _ = tx.send(Ok(exit));
            }
            Behavior::HoldUntilKilled => {
                let watch = kill.clone();
                tokio::spawn(async move {
                    watch.killed().await;
                    let _ = tx.send(Ok(WorkerExit::Signaled { signal: 15 }));
                });
            }
            Behavior::SpawnFail => unreachable!(),
        }
        Ok(WorkerProcess::new(Some(4242), kill, rx))
    }
}

// ---------------------------------------------------------------------------
// Fake front
// ---------------------------------------------------------------------------

/// Records proxied calls and serves fixed content.
#[derive(Default)]
pub struct FakeFront {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl InteractiveFront for FakeFront {
    async fn get(
        &self,
        front: &str,
        path: &str,
        _query: Option<&str>,
    ) -> Result<FrontContent, FrontError> {
        self.calls.lock().unwrap().push(format!("get {front} {path}"));
        if path == "missing.html" {
            return Err(FrontError::Remote {
                status: 404,
                body: "file not found".into(),
            });
        }
        Ok(FrontContent {
            content_type: Some("text/html".into()),
            body: b"<html></html>".to_vec(),
        })
    }

    async fn create(&self, front: &str, path: &str, _content: Vec<u8>) -> Result<(), FrontError> {
        self.calls.lock().unwrap().push(format!("create {front} {path}"));
        Ok(())
    }

    async fn delete(&self, front: &str, path: &str) -> Result<(), FrontError> {
        self.calls.lock().unwrap().push(format!("delete {front} {path}"));
        Ok(())
    }

    async fn list(&self, front: &str, path: &str) -> Result<Vec<String>, FrontError> {
        self.calls.lock().unwrap().push(format!("list {front} {path}"));
        Ok(vec!["index.html".into()])
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<FsJobStore>,
    pub bus: Arc<EventBus>,
    pub front: Arc<FakeFront>,
    pub interactions: Arc<InteractionManager>,
    pub supervisor: Arc<FakeSupervisor>,
    pub queue: Arc<JobQueue>,
    pub events: broadcast::Receiver<JobEvent>,
}

pub fn config(dir: &TempDir, max_queue: usize) -> PipelineConfig {
    PipelineConfig {
        max_queue,
        worker_program: "fake-worker".into(),
        stand_alone: false,
        staging_root: dir.path().join("staging"),
        workspace_root: dir.path().join("workspace"),
        callback_address: "http://127.0.0.1:56001/api/v1".into(),
        interaction_timeout: None,
    }
}

impl Harness {
    pub fn new(max_queue: usize) -> Self {
        Self::with_timeout(max_queue, None)
    }

    pub fn with_timeout(max_queue: usize, timeout: Option<Duration>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir, max_queue);
        config.interaction_timeout = timeout;

        let store = Arc::new(FsJobStore::new(&config.workspace_root));
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();
        let front = Arc::new(FakeFront::default());
        let interactions = Arc::new(InteractionManager::new(
            store.clone(),
            bus.clone(),
            front.clone(),
            timeout,
        ));
        let supervisor = FakeSupervisor::new();
        let queue = JobQueue::start(
            config,
            store.clone(),
            supervisor.clone(),
            interactions.clone(),
            bus.clone(),
        );

        Self {
            dir,
            store,
            bus,
            front,
            interactions,
            supervisor,
            queue,
            events,
        }
    }

    /// Persist a job with an uploaded package.
    pub fn job(&self, id: &str) -> Job {
        let mut job = Job::with_id(id, "alice").with_package("flow.ppg");
        self.store.save(&mut job).unwrap();
        let package = self.store.locations(&job).package.unwrap();
        std::fs::create_dir_all(package.parent().unwrap()).unwrap();
        std::fs::write(package, "package").unwrap();
        job
    }

    pub fn staging_root(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    /// Next event for `job_id`, skipping other jobs' events.
    pub async fn next_event(&mut self, job_id: &str) -> ClientEvent {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let event = self.events.recv().await.unwrap();
                if event.job_id == job_id {
                    return event.event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Next status event for `job_id`, skipping non-status events.
    pub async fn next_status(&mut self, job_id: &str) -> JobStatusEvent {
        loop {
            if let Some(status) = self.next_event(job_id).await.as_status() {
                return status;
            }
        }
    }

    /// Assert that nothing at all is published for `job_id` for a moment.
    pub async fn assert_quiet(&mut self, job_id: &str) {
        let quiet = tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                let event = self.events.recv().await.unwrap();
                if event.job_id == job_id {
                    return event.event;
                }
            }
        })
        .await;
        assert!(quiet.is_err(), "unexpected event: {:?}", quiet.unwrap());
    }
}
