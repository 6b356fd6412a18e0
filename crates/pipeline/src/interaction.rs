//! Interactive operation manager.
//!
//! A running worker may pause and ask the browser that owns its job for
//! input. The worker's call blocks until the browser answers, giving the
//! worker a plain call/return model over the asynchronous websocket channel.
//!
//! Per interaction key the lifecycle is
//! `UNKNOWN → REQUESTED → FINISHED → removed`:
//!
//! 1. [`InteractionManager::request`] registers the key together with the
//!    sending half of a oneshot channel, then takes the per-job lock,
//!    announces the interaction to the job's browsers and awaits the
//!    receiving half.
//! 2. [`InteractionManager::finish`] looks the key up and sends the result
//!    through the stored sender.
//! 3. When `request` returns, on every path, a guard removes the key and
//!    the per-job lock is released.
//!
//! The waker exists before any notification is sent, so a `finish` can
//! never be lost, even one that arrives while the request still queues for
//! the per-job lock. If the job is cleared while an interaction waits, the
//! sender is dropped and the request resolves as
//! [`InteractionError::Canceled`]. Once `InteractionStart` has been
//! published, every outcome (answer, timeout, cancellation) is closed with an
//! `InteractionFinish` carrying that outcome.
//!
//! # Locking
//!
//! The per-job lock is held for the whole request → wait → finish span,
//! which can last minutes. This is intentional: only one browser view is
//! meaningful per job, so interactions for the same job are strictly
//! serialized. Do not shorten this critical section. The lock-table and the
//! pending-table locks, in contrast, are only ever held for map operations
//! and never across an await.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jobfront_core::store::JobStore;
use jobfront_core::types::JobId;
use jobfront_events::{ClientEvent, EventBus, InteractionOutcome, InteractionPrompt, JobEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::front::{FrontContent, FrontError, InteractiveFront};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Composite key of one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InteractionKey {
    pub job_id: JobId,
    pub interaction_id: String,
}

impl InteractionKey {
    pub fn new(job_id: impl Into<JobId>, interaction_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            interaction_id: interaction_id.into(),
        }
    }
}

impl fmt::Display for InteractionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_id, self.interaction_id)
    }
}

/// Interaction mode named by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    Page,
    Dialog,
}

impl FromStr for InteractionMode {
    type Err = InteractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(Self::Page),
            "dialog" => Ok(Self::Dialog),
            other => Err(InteractionError::UnknownMode(other.to_string())),
        }
    }
}

/// What the worker asks the browser to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum InteractionRequest {
    /// Render a page served by the worker's interactive front.
    Page { front_address: String },
    /// Show inline content.
    Dialog {
        content: String,
        #[serde(default)]
        script: Option<String>,
    },
}

impl InteractionRequest {
    /// Build a request from a mode name and its payload object.
    pub fn from_parts(mode: &str, payload: Value) -> Result<Self, InteractionError> {
        match mode.parse::<InteractionMode>()? {
            InteractionMode::Page => {
                #[derive(Deserialize)]
                struct Page {
                    front_address: String,
                }
                let page: Page = serde_json::from_value(payload)?;
                Ok(Self::Page {
                    front_address: page.front_address,
                })
            }
            InteractionMode::Dialog => {
                #[derive(Deserialize)]
                struct Dialog {
                    content: String,
                    #[serde(default)]
                    script: Option<String>,
                }
                let dialog: Dialog = serde_json::from_value(payload)?;
                Ok(Self::Dialog {
                    content: dialog.content,
                    script: dialog.script,
                })
            }
        }
    }

    pub fn mode(&self) -> InteractionMode {
        match self {
            Self::Page { .. } => InteractionMode::Page,
            Self::Dialog { .. } => InteractionMode::Dialog,
        }
    }
}

/// Errors returned to interaction callers.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("interaction {0} exists already")]
    DuplicateInteraction(InteractionKey),

    #[error("no such interaction: {0}")]
    UnknownInteraction(InteractionKey),

    #[error("the job is unknown: {0}")]
    UnknownJob(JobId),

    #[error("unknown interaction mode: {0}")]
    UnknownMode(String),

    #[error("invalid interaction payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("interaction {0} has no interactive front")]
    NoFront(InteractionKey),

    #[error("interaction {0} was canceled")]
    Canceled(InteractionKey),

    #[error("interaction {0} timed out")]
    TimedOut(InteractionKey),

    #[error(transparent)]
    Front(#[from] FrontError),
}

/// A registered interaction.
struct Pending {
    /// Worker front for page-mode interactions.
    front: Option<String>,
    /// Wakes the waiting request; taken by the first `finish`.
    waker: Option<oneshot::Sender<Value>>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Coordinates blocking worker ↔ browser interactions.
///
/// Shared via `Arc<InteractionManager>` between the HTTP layer and the
/// dispatcher.
pub struct InteractionManager {
    jobs: Arc<dyn JobStore>,
    event_bus: Arc<EventBus>,
    front: Arc<dyn InteractiveFront>,
    timeout: Option<Duration>,
    /// One async mutex per job, created lazily under this table's lock.
    job_locks: Mutex<HashMap<JobId, Arc<tokio::sync::Mutex<()>>>>,
    pending: Mutex<HashMap<InteractionKey, Pending>>,
}

impl InteractionManager {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        event_bus: Arc<EventBus>,
        front: Arc<dyn InteractiveFront>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            jobs,
            event_bus,
            front,
            timeout,
            job_locks: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Open an interaction and block until the browser finishes it.
    ///
    /// Fails fast with [`InteractionError::DuplicateInteraction`] if the key
    /// is already registered. Interactions of the same job queue up behind
    /// the per-job lock.
    pub async fn request(
        &self,
        job_id: &str,
        interaction_id: &str,
        request: InteractionRequest,
    ) -> Result<Value, InteractionError> {
        self.ensure_job(job_id)?;

        let key = InteractionKey::new(job_id, interaction_id);
        let (waker, mut wait) = oneshot::channel();
        let front = match &request {
            InteractionRequest::Page { front_address } => Some(front_address.clone()),
            InteractionRequest::Dialog { .. } => None,
        };
        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(&key) {
                return Err(InteractionError::DuplicateInteraction(key));
            }
            pending.insert(
                key.clone(),
                Pending {
                    front,
                    waker: Some(waker),
                },
            );
        }
        let _registration = Registration {
            manager: self,
            key: &key,
        };

        let job_lock = self.job_lock(job_id);
        let _job_guard = job_lock.lock_owned().await;

        // While queued, the waker may have been taken by `clear_job` or by an
        // early `finish`. The browser is not told about either.
        if !self.has_waker(&key) {
            return wait.await.map_err(|_| {
                tracing::info!(job_id, interaction_id, "Interaction canceled before start");
                InteractionError::Canceled(key.clone())
            });
        }

        // The job may have been deleted while we queued for the lock.
        self.ensure_job(job_id)?;

        tracing::info!(job_id, interaction_id, mode = ?request.mode(), "Interaction started");
        let prompt = match request {
            InteractionRequest::Page { .. } => InteractionPrompt::Page {
                url: format!("/interactive/{job_id}/{interaction_id}/index.html"),
            },
            InteractionRequest::Dialog { content, script } => {
                InteractionPrompt::Dialog { content, script }
            }
        };
        self.event_bus.publish(JobEvent::new(
            job_id,
            ClientEvent::InteractionStart {
                interaction_id: interaction_id.to_string(),
                prompt,
            },
        ));

        // From here on every exit publishes an `InteractionFinish`.
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // Refuse later answers; one that arrived first still wins.
                    wait.close();
                    match wait.try_recv() {
                        Ok(result) => Ok(result),
                        Err(_) => {
                            tracing::warn!(job_id, interaction_id, "Interaction timed out");
                            self.publish_finish(
                                job_id,
                                interaction_id,
                                InteractionOutcome::TimedOut,
                            );
                            return Err(InteractionError::TimedOut(key.clone()));
                        }
                    }
                }
            },
            None => wait.await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::info!(job_id, interaction_id, "Interaction canceled");
                self.publish_finish(job_id, interaction_id, InteractionOutcome::Canceled);
                return Err(InteractionError::Canceled(key.clone()));
            }
        };

        self.publish_finish(job_id, interaction_id, InteractionOutcome::Finished);
        tracing::info!(job_id, interaction_id, "Interaction finished");
        Ok(result)
    }

    /// Deliver the browser's answer to the waiting request.
    pub fn finish(
        &self,
        job_id: &str,
        interaction_id: &str,
        result: Value,
    ) -> Result<(), InteractionError> {
        let key = InteractionKey::new(job_id, interaction_id);
        let waker = lock(&self.pending)
            .get_mut(&key)
            .and_then(|pending| pending.waker.take());

        match waker {
            Some(waker) => waker
                .send(result)
                .map_err(|_| InteractionError::UnknownInteraction(key)),
            None => Err(InteractionError::UnknownInteraction(key)),
        }
    }

    /// Whether the key is currently registered.
    pub fn is_known(&self, job_id: &str, interaction_id: &str) -> bool {
        lock(&self.pending).contains_key(&InteractionKey::new(job_id, interaction_id))
    }

    /// Cancel whatever is pending for a job and drop its front bindings.
    ///
    /// Called by the dispatcher when the job's worker run ends. Waiting
    /// requests resolve as [`InteractionError::Canceled`].
    pub fn clear_job(&self, job_id: &str) {
        let mut canceled = 0usize;
        {
            let mut pending = lock(&self.pending);
            for (key, entry) in pending.iter_mut() {
                if key.job_id == job_id {
                    entry.front = None;
                    if entry.waker.take().is_some() {
                        canceled += 1;
                    }
                }
            }
        }
        {
            let mut locks = lock(&self.job_locks);
            // Only this table holds the Arc when nobody is inside or queued.
            if locks
                .get(job_id)
                .is_some_and(|l| Arc::strong_count(l) == 1)
            {
                locks.remove(job_id);
            }
        }
        if canceled > 0 {
            tracing::info!(job_id, canceled, "Canceled pending interactions");
        }
    }

    // ---- proxied front operations ----

    pub async fn get(
        &self,
        job_id: &str,
        interaction_id: &str,
        path: &str,
        query: Option<&str>,
    ) -> Result<FrontContent, InteractionError> {
        let front = self.front_of(job_id, interaction_id)?;
        Ok(self.front.get(&front, path, query).await?)
    }

    pub async fn create(
        &self,
        job_id: &str,
        interaction_id: &str,
        path: &str,
        content: Vec<u8>,
    ) -> Result<(), InteractionError> {
        let front = self.front_of(job_id, interaction_id)?;
        Ok(self.front.create(&front, path, content).await?)
    }

    pub async fn delete(
        &self,
        job_id: &str,
        interaction_id: &str,
        path: &str,
    ) -> Result<(), InteractionError> {
        let front = self.front_of(job_id, interaction_id)?;
        Ok(self.front.delete(&front, path).await?)
    }

    pub async fn list(
        &self,
        job_id: &str,
        interaction_id: &str,
        path: &str,
    ) -> Result<Vec<String>, InteractionError> {
        let front = self.front_of(job_id, interaction_id)?;
        Ok(self.front.list(&front, path).await?)
    }

    // ---- private helpers ----

    fn ensure_job(&self, job_id: &str) -> Result<(), InteractionError> {
        match self.jobs.find_job(job_id) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(InteractionError::UnknownJob(job_id.to_string())),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Job lookup failed");
                Err(InteractionError::UnknownJob(job_id.to_string()))
            }
        }
    }

    fn has_waker(&self, key: &InteractionKey) -> bool {
        lock(&self.pending)
            .get(key)
            .is_some_and(|pending| pending.waker.is_some())
    }

    fn publish_finish(&self, job_id: &str, interaction_id: &str, outcome: InteractionOutcome) {
        self.event_bus.publish(JobEvent::new(
            job_id,
            ClientEvent::InteractionFinish {
                interaction_id: interaction_id.to_string(),
                outcome,
            },
        ));
    }

    fn job_lock(&self, job_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(lock(&self.job_locks).entry(job_id.to_string()).or_default())
    }

    fn front_of(&self, job_id: &str, interaction_id: &str) -> Result<String, InteractionError> {
        let key = InteractionKey::new(job_id, interaction_id);
        let pending = lock(&self.pending);
        match pending.get(&key) {
            None => Err(InteractionError::UnknownInteraction(key)),
            Some(entry) => entry
                .front
                .clone()
                .ok_or(InteractionError::NoFront(key)),
        }
    }
}

/// Removes a registered key when the request ends, on every path.
struct Registration<'a> {
    manager: &'a InteractionManager,
    key: &'a InteractionKey,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(&self.manager.pending).remove(self.key);
    }
}

/// Table locks are never held across a panic-prone section, so a poisoned
/// lock still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
