use std::sync::Arc;

use jobfront_core::store::JobStore;
use jobfront_events::{EventBus, GroupBroadcaster};
use jobfront_pipeline::{InteractionManager, JobQueue};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Job-id → connection membership used to address events.
    pub groups: Arc<GroupBroadcaster>,
    /// Job records and their file locations.
    pub job_store: Arc<dyn JobStore>,
    pub job_queue: Arc<JobQueue>,
    pub interactions: Arc<InteractionManager>,
    /// Event bus the dispatcher and interaction manager publish on.
    pub event_bus: Arc<EventBus>,
}
