//! Event-to-group routing.
//!
//! [`GroupRouter`] subscribes to the job event bus and delivers each event
//! to the WebSocket connections currently watching the event's job.

use std::sync::Arc;

use axum::extract::ws::Message;
use jobfront_events::{GroupBroadcaster, JobEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ws::WsManager;

/// Routes job events to the connection group of their job.
pub struct GroupRouter {
    groups: Arc<GroupBroadcaster>,
    ws_manager: Arc<WsManager>,
}

impl GroupRouter {
    pub fn new(groups: Arc<GroupBroadcaster>, ws_manager: Arc<WsManager>) -> Self {
        Self { groups, ws_manager }
    }

    /// Run the routing loop.
    ///
    /// Exits when the bus closes, or when `cancel` fires, after delivering
    /// whatever was already published.
    pub async fn run(self, mut receiver: broadcast::Receiver<JobEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    while let Ok(event) = receiver.try_recv() {
                        self.route_event(&event).await;
                    }
                    tracing::info!("Group router shutting down");
                    break;
                }
                next = receiver.recv() => match next {
                    Ok(event) => { self.route_event(&event).await; }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Group router lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, group router shutting down");
                        break;
                    }
                },
            }
        }
    }

    /// Deliver one event to its job's group.
    ///
    /// Membership is snapshotted first; sending happens without holding the
    /// group table lock.
    pub async fn route_event(&self, event: &JobEvent) -> usize {
        let members = self.groups.members_of(&event.job_id).await;
        if members.is_empty() {
            return 0;
        }

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(job_id = %event.job_id, error = %e, "Failed to serialize job event");
                return 0;
            }
        };

        let delivered = self
            .ws_manager
            .send_to(&members, Message::Text(frame.into()))
            .await;
        tracing::debug!(
            job_id = %event.job_id,
            event = event.event.name(),
            delivered,
            "Routed job event",
        );
        delivered
    }
}
