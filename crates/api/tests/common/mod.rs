//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use jobfront_core::job::Job;
use jobfront_core::store::{FsJobStore, JobStore};
use jobfront_events::{EventBus, GroupBroadcaster, JobEvent};
use jobfront_pipeline::{HttpFront, InteractionManager, JobQueue, PipelineConfig};
use jobfront_worker::{
    KillSwitch, ProcessSupervisor, WorkerCommand, WorkerError, WorkerExit, WorkerProcess,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{broadcast, oneshot};
use tower::ServiceExt;

use jobfront_api::config::ServerConfig;
use jobfront_api::router::build_app_router;
use jobfront_api::state::AppState;
use jobfront_api::ws::WsManager;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// Worker that finishes successfully right away, leaving one output file.
pub struct InstantSupervisor;

impl ProcessSupervisor for InstantSupervisor {
    fn spawn(&self, command: &WorkerCommand) -> Result<WorkerProcess, WorkerError> {
        std::fs::write(command.output.join("result.txt"), "done").map_err(|source| {
            WorkerError::Spawn {
                program: command.program.clone(),
                source,
            }
        })?;
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(WorkerExit::Success));
        Ok(WorkerProcess::new(None, KillSwitch::new(), rx))
    }
}

/// A fully wired application over a temporary workspace.
pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub state: AppState,
    pub events: broadcast::Receiver<JobEvent>,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PipelineConfig {
            max_queue: 5,
            worker_program: "fake-worker".into(),
            stand_alone: false,
            staging_root: dir.path().join("staging"),
            workspace_root: dir.path().join("workspace"),
            callback_address: "http://127.0.0.1:0/api/v1".into(),
            interaction_timeout: None,
        };

        let config = test_config();
        let job_store = Arc::new(FsJobStore::new(&pipeline.workspace_root));
        let event_bus = Arc::new(EventBus::default());
        let events = event_bus.subscribe();
        let interactions = Arc::new(InteractionManager::new(
            job_store.clone(),
            Arc::clone(&event_bus),
            Arc::new(HttpFront::new()),
            None,
        ));
        let job_queue = JobQueue::start(
            pipeline,
            job_store.clone(),
            Arc::new(InstantSupervisor),
            Arc::clone(&interactions),
            Arc::clone(&event_bus),
        );

        let state = AppState {
            config: Arc::new(config.clone()),
            ws_manager: Arc::new(WsManager::new()),
            groups: Arc::new(GroupBroadcaster::new()),
            job_store,
            job_queue,
            interactions,
            event_bus,
        };
        let app = build_app_router(state.clone(), &config);

        Self {
            dir,
            app,
            state,
            events,
        }
    }

    /// Persist a job with an uploaded package.
    pub fn job(&self, id: &str) -> Job {
        let mut job = Job::with_id(id, "alice").with_package("flow.ppg");
        self.state.job_store.save(&mut job).unwrap();
        let package = self.state.job_store.locations(&job).package.unwrap();
        std::fs::create_dir_all(package.parent().unwrap()).unwrap();
        std::fs::write(package, "package").unwrap();
        job
    }

    /// Next event published for `job_id`.
    pub async fn next_event(&mut self, job_id: &str) -> JobEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.unwrap();
                if event.job_id == job_id {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
