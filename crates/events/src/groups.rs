//! Job-id → websocket connection membership.
//!
//! A browser tab joins the group of the job it is watching; status and
//! interaction events for that job go to every member. One connection may
//! watch several jobs (multi-tab) and must be removed from all of them when
//! it disconnects.

use std::collections::{HashMap, HashSet};

use jobfront_core::types::{ConnId, JobId};
use tokio::sync::RwLock;

/// Thread-safe group membership table.
///
/// Every mutation and every snapshot takes the lock exactly once. Delivery
/// to the members happens on the snapshot, outside the lock.
pub struct GroupBroadcaster {
    groups: RwLock<HashMap<JobId, HashSet<ConnId>>>,
}

impl GroupBroadcaster {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to the group of `job_id`.
    pub async fn join(&self, job_id: &str, conn_id: &str) {
        self.groups
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
        tracing::debug!(job_id, conn_id, "Connection joined job group");
    }

    /// Remove a connection from one group. Empty groups are dropped.
    pub async fn leave(&self, job_id: &str, conn_id: &str) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(job_id) {
            members.remove(conn_id);
            if members.is_empty() {
                groups.remove(job_id);
            }
        }
    }

    /// Remove a connection from every group it belongs to.
    pub async fn drop_everywhere(&self, conn_id: &str) {
        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            members.remove(conn_id);
            !members.is_empty()
        });
    }

    /// Snapshot of the connections watching `job_id`.
    pub async fn members_of(&self, job_id: &str) -> HashSet<ConnId> {
        self.groups
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-empty groups.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}

impl Default for GroupBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> HashSet<ConnId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn drop_everywhere_keeps_other_members() {
        let groups = GroupBroadcaster::new();
        groups.join("J", "c1").await;
        groups.join("J", "c2").await;

        groups.drop_everywhere("c1").await;

        assert_eq!(groups.members_of("J").await, set(&["c2"]));
    }

    #[tokio::test]
    async fn drop_everywhere_covers_all_jobs() {
        let groups = GroupBroadcaster::new();
        groups.join("A", "tab").await;
        groups.join("B", "tab").await;
        groups.join("B", "other").await;

        groups.drop_everywhere("tab").await;

        assert!(groups.members_of("A").await.is_empty());
        assert_eq!(groups.members_of("B").await, set(&["other"]));
        assert_eq!(groups.group_count().await, 1);
    }

    #[tokio::test]
    async fn leave_removes_empty_group() {
        let groups = GroupBroadcaster::new();
        groups.join("J", "c1").await;
        groups.leave("J", "c1").await;

        assert_eq!(groups.group_count().await, 0);
    }

    #[tokio::test]
    async fn leave_unknown_is_noop() {
        let groups = GroupBroadcaster::new();
        groups.join("J", "c1").await;
        groups.leave("J", "ghost").await;
        groups.leave("other", "c1").await;

        assert_eq!(groups.members_of("J").await, set(&["c1"]));
    }

    #[tokio::test]
    async fn joining_twice_is_idempotent() {
        let groups = GroupBroadcaster::new();
        groups.join("J", "c1").await;
        groups.join("J", "c1").await;

        assert_eq!(groups.members_of("J").await.len(), 1);
    }
}
