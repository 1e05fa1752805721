//! Per-participant assignment inboxes

use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tandem_types::{Assignment, TaskId, UserId};
use tokio::sync::Notify;

#[derive(Default)]
struct Inbox {
    queue: parking_lot::Mutex<VecDeque<Assignment>>,
    delivered: Notify,
    // One claimer at a time per user.
    claim: tokio::sync::Mutex<()>,
}

/// Routes assignments to the participant they are meant for.
pub struct Dispatcher {
    inboxes: DashMap<UserId, Arc<Inbox>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inboxes: DashMap::new(),
        }
    }

    fn inbox(&self, user_id: &UserId) -> Arc<Inbox> {
        Arc::clone(self.inboxes.entry(user_id.clone()).or_default().value())
    }

    pub fn deliver(&self, user_id: &UserId, assignment: Assignment) {
        let inbox = self.inbox(user_id);
        inbox.queue.lock().push_back(assignment);
        inbox.delivered.notify_one();
    }

    /// Wait for the next assignment. `None` when `timeout` elapses first.
    pub async fn next(&self, user_id: &UserId, timeout: Option<Duration>) -> Option<Assignment> {
        let inbox = self.inbox(user_id);
        let wait = async {
            let _claim = inbox.claim.lock().await;
            loop {
                if let Some(assignment) = inbox.queue.lock().pop_front() {
                    return assignment;
                }
                // A delivery racing this check leaves a permit behind.
                inbox.delivered.notified().await;
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
            None => Some(wait.await),
        }
    }

    /// Assignments waiting for `user_id`.
    pub fn pending(&self, user_id: &UserId) -> usize {
        self.inboxes
            .get(user_id)
            .map_or(0, |inbox| inbox.queue.lock().len())
    }

    pub fn inbox_count(&self) -> usize {
        self.inboxes.len()
    }

    /// Drop unclaimed assignments of `tasks`, then every inbox that is empty
    /// and not being waited on.
    pub fn discard(&self, tasks: &HashSet<TaskId>) -> usize {
        let mut dropped = 0;
        self.inboxes.retain(|_, inbox| {
            let mut queue = inbox.queue.lock();
            let before = queue.len();
            queue.retain(|assignment| !tasks.contains(&assignment.task_id));
            dropped += before - queue.len();
            !queue.is_empty() || Arc::strong_count(inbox) > 1
        });
        dropped
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
