//! Task lifecycle manager
//!
//! Every task lives in its own cell: a mutex around the record and the
//! liveness deadlines, plus a `watch` channel that broadcasts the status to
//! waiters. Decisions about a task are taken under its mutex only.

use crate::catalog::ProtocolCatalog;
use crate::dispatch::Dispatcher;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tandem_store::EntryStore;
use tandem_types::{
    Assignment, CoordinationError, FailureReason, ParticipantReport, ProtocolSpec, Result,
    RunTaskRequest, Task, TaskId, TaskStatus, Transition, UserId,
};
use tokio::sync::watch;
use tokio::time::Instant;

/// Task manager configuration
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Liveness timeout for runs that do not override it
    pub default_liveness_timeout: Duration,
    /// How long a terminal task stays around before it is collected
    pub gc_horizon: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            default_liveness_timeout: Duration::from_secs(60),
            gc_horizon: Duration::from_secs(600),
        }
    }
}

/// Task counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

struct TaskState {
    task: Task,
    liveness_timeout: Duration,
    /// Only participants that have not reported yet have a deadline.
    deadlines: HashMap<UserId, Instant>,
    observers: HashSet<UserId>,
    finished_at: Option<Instant>,
}

impl TaskState {
    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        let current = self.task.status;
        if !current.can_transition_to(next) {
            return Err(if current.is_terminal() {
                CoordinationError::TaskAlreadyTerminal(format!(
                    "task {} is already {current}",
                    self.task.task_id
                ))
            } else {
                CoordinationError::InvalidStatus(format!("{current} -> {next}"))
            });
        }
        let now = Utc::now();
        self.task.status = next;
        self.task.updated_at = now;
        self.task.transitions.push(Transition { status: next, at: now });
        Ok(())
    }

    fn collectable(&self, now: Instant, horizon: Duration) -> bool {
        let Some(finished_at) = self.finished_at else {
            return false;
        };
        now.saturating_duration_since(finished_at) >= horizon
            || self
                .task
                .participants
                .iter()
                .all(|p| self.observers.contains(&p.user_id))
    }

    /// Error for a participant touching a task that already ended.
    fn terminal_error(&self, user_id: &UserId) -> CoordinationError {
        match &self.task.failure {
            Some(FailureReason::LivenessTimeout { user_id: dead }) if dead == user_id => {
                CoordinationError::LivenessTimeout(format!(
                    "{user_id} missed its liveness deadline on task {}",
                    self.task.task_id
                ))
            }
            _ => CoordinationError::TaskAlreadyTerminal(format!(
                "task {} is already {}",
                self.task.task_id, self.task.status
            )),
        }
    }
}

struct TaskCell {
    task_id: TaskId,
    state: Mutex<TaskState>,
    status_tx: watch::Sender<TaskStatus>,
}

impl TaskCell {
    fn finish(
        &self,
        state: &mut TaskState,
        status: TaskStatus,
        failure: Option<FailureReason>,
    ) -> Result<()> {
        state.transition(status)?;
        state.task.failure = failure;
        state.deadlines.clear();
        state.finished_at = Some(Instant::now());
        self.status_tx.send_replace(status);
        Ok(())
    }

    fn next_deadline(&self) -> Option<Instant> {
        let state = self.state.lock();
        if state.task.status.is_terminal() {
            return None;
        }
        state.deadlines.values().min().copied()
    }

    /// Fail the task if some participant is past its deadline.
    fn expire_overdue(&self, now: Instant) -> Option<UserId> {
        let mut state = self.state.lock();
        if state.task.status.is_terminal() {
            return None;
        }
        let overdue = state
            .task
            .participants
            .iter()
            .map(|p| &p.user_id)
            .find(|user| state.deadlines.get(*user).is_some_and(|d| *d <= now))
            .cloned()?;

        let failure = FailureReason::LivenessTimeout {
            user_id: overdue.clone(),
        };
        self.finish(&mut state, TaskStatus::Failed, Some(failure)).ok()?;
        Some(overdue)
    }
}

async fn watch_liveness(cell: Arc<TaskCell>) {
    let mut status_rx = cell.status_tx.subscribe();
    loop {
        let Some(deadline) = cell.next_deadline() else {
            return;
        };
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(user_id) = cell.expire_overdue(Instant::now()) {
                    tracing::warn!(
                        task_id = %cell.task_id,
                        user_id = %user_id,
                        "Participant missed liveness deadline, task failed"
                    );
                    return;
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() || status_rx.borrow().is_terminal() {
                    return;
                }
            }
        }
    }
}

/// Owns every task record and drives the lifecycle.
pub struct TaskManager {
    catalog: ProtocolCatalog,
    tasks: DashMap<TaskId, Arc<TaskCell>>,
    dispatcher: Dispatcher,
    store: Arc<EntryStore>,
    config: TaskManagerConfig,
}

impl TaskManager {
    pub fn new(store: Arc<EntryStore>, config: TaskManagerConfig) -> Self {
        Self {
            catalog: ProtocolCatalog::new(),
            tasks: DashMap::new(),
            dispatcher: Dispatcher::new(),
            store,
            config,
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    pub fn declare_protocol(&self, spec: ProtocolSpec) -> Result<bool> {
        self.catalog.declare(spec)
    }

    pub fn protocol(&self, name: &str) -> Result<ProtocolSpec> {
        self.catalog.get(name)
    }

    pub fn protocols(&self) -> Vec<ProtocolSpec> {
        self.catalog.list()
    }

    fn cell(&self, task_id: TaskId) -> Result<Arc<TaskCell>> {
        self.tasks
            .get(&task_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| CoordinationError::UnknownTask(task_id.to_string()))
    }

    /// Validate the participant set, create the record, open its entry scope
    /// and hand one assignment to every participant.
    pub async fn run_task(&self, initiator: &UserId, request: RunTaskRequest) -> Result<TaskId> {
        let spec = self.catalog.get(&request.protocol_name)?;
        spec.validate_participants(&request.participants)?;

        let liveness_timeout = request
            .options
            .liveness_timeout()
            .unwrap_or(self.config.default_liveness_timeout);
        if liveness_timeout.is_zero() {
            return Err(CoordinationError::InvalidRequest(
                "liveness timeout must be positive".to_string(),
            ));
        }

        let task = Task::new(
            request.protocol_name,
            initiator.clone(),
            request.participants,
            request.payload,
        );
        let task_id = task.task_id;

        self.store.open_scope(
            task_id,
            &task.protocol_name,
            task.participants.iter().map(|p| p.user_id.clone()),
        )?;

        let assignments: Vec<(UserId, Assignment)> = task
            .participants
            .iter()
            .map(|p| {
                let assignment = Assignment {
                    task_id,
                    protocol_name: task.protocol_name.clone(),
                    role: p.role.clone(),
                    participants: task.participants.clone(),
                    payload: task.payload.clone(),
                    liveness_timeout_ms: u64::try_from(liveness_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                };
                (p.user_id.clone(), assignment)
            })
            .collect();

        let now = Instant::now();
        let deadlines = task
            .participants
            .iter()
            .map(|p| (p.user_id.clone(), now + liveness_timeout))
            .collect();
        let protocol_name = task.protocol_name.clone();

        let mut state = TaskState {
            task,
            liveness_timeout,
            deadlines,
            observers: HashSet::new(),
            finished_at: None,
        };
        state.transition(TaskStatus::Running)?;

        let (status_tx, _) = watch::channel(TaskStatus::Running);
        let cell = Arc::new(TaskCell {
            task_id,
            state: Mutex::new(state),
            status_tx,
        });
        self.tasks.insert(task_id, Arc::clone(&cell));
        tokio::spawn(watch_liveness(cell));

        let count = assignments.len();
        for (user_id, assignment) in assignments {
            self.dispatcher.deliver(&user_id, assignment);
        }

        tracing::info!(
            task_id = %task_id,
            protocol = %protocol_name,
            initiator = %initiator,
            participants = count,
            "Task started"
        );

        Ok(task_id)
    }

    /// Block until the task is terminal. `None` waits forever.
    pub async fn wait_task(
        &self,
        task_id: TaskId,
        caller: &UserId,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus> {
        let cell = self.cell(task_id)?;
        if !cell.state.lock().task.can_observe(caller) {
            return Err(CoordinationError::Unauthorized(format!(
                "{caller} is not part of task {task_id}"
            )));
        }

        let mut rx = cell.status_tx.subscribe();
        let wait = rx.wait_for(TaskStatus::is_terminal);
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                CoordinationError::Timeout(format!("task {task_id} not terminal within {limit:?}"))
            })?,
            None => wait.await,
        };
        let status = outcome
            .map(|status| *status)
            .map_err(|_| CoordinationError::UnknownTask(task_id.to_string()))?;

        cell.state.lock().observers.insert(caller.clone());
        Ok(status)
    }

    /// Record a participant's own outcome and derive the task status.
    pub fn report_status(
        &self,
        task_id: TaskId,
        reporter: &UserId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> Result<TaskStatus> {
        if !status.is_terminal() {
            return Err(CoordinationError::InvalidStatus(format!(
                "participants report completed or failed, not {status}"
            )));
        }

        let cell = self.cell(task_id)?;
        let mut state = cell.state.lock();
        if !state.task.is_participant(reporter) {
            return Err(CoordinationError::Unauthorized(format!(
                "{reporter} is not a participant of task {task_id}"
            )));
        }
        if state.task.status.is_terminal() {
            return Err(state.terminal_error(reporter));
        }
        if state.task.report_of(reporter).is_some() {
            return Err(CoordinationError::InvalidStatus(format!(
                "{reporter} already reported on task {task_id}"
            )));
        }

        let now = Utc::now();
        state.task.reports.push(ParticipantReport {
            user_id: reporter.clone(),
            status,
            reason: reason.clone(),
            at: now,
        });
        state.task.updated_at = now;
        state.deadlines.remove(reporter);

        match status {
            TaskStatus::Failed => {
                let failure = FailureReason::ParticipantFailed {
                    user_id: reporter.clone(),
                    reason,
                };
                cell.finish(&mut state, TaskStatus::Failed, Some(failure))?;
                tracing::warn!(task_id = %task_id, user_id = %reporter, "Task failed");
            }
            _ if state.task.pending_participants().next().is_none() => {
                cell.finish(&mut state, TaskStatus::Completed, None)?;
                tracing::info!(task_id = %task_id, "Task completed");
            }
            _ => {
                tracing::debug!(task_id = %task_id, user_id = %reporter, "Participant completed");
            }
        }

        Ok(state.task.status)
    }

    /// Push the reporter's liveness deadline out by one timeout.
    pub fn heartbeat(&self, task_id: TaskId, reporter: &UserId) -> Result<()> {
        let cell = self.cell(task_id)?;
        let mut state = cell.state.lock();
        if !state.task.is_participant(reporter) {
            return Err(CoordinationError::Unauthorized(format!(
                "{reporter} is not a participant of task {task_id}"
            )));
        }
        if state.task.status.is_terminal() {
            return Err(state.terminal_error(reporter));
        }
        let next = Instant::now() + state.liveness_timeout;
        if let Some(deadline) = state.deadlines.get_mut(reporter) {
            *deadline = next;
        }
        Ok(())
    }

    /// Next assignment of `user_id` whose task is still running.
    pub async fn claim_assignment(
        &self,
        user_id: &UserId,
        timeout: Option<Duration>,
    ) -> Result<Option<Assignment>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let Some(assignment) = self.dispatcher.next(user_id, remaining).await else {
                return Ok(None);
            };

            let live = self
                .tasks
                .get(&assignment.task_id)
                .is_some_and(|cell| !cell.state.lock().task.status.is_terminal());
            if live {
                return Ok(Some(assignment));
            }
            tracing::debug!(
                task_id = %assignment.task_id,
                user_id = %user_id,
                "Skipping assignment of finished task"
            );
        }
    }

    pub fn get_task(&self, task_id: TaskId, caller: &UserId) -> Result<Task> {
        let cell = self.cell(task_id)?;
        let state = cell.state.lock();
        if !state.task.can_observe(caller) {
            return Err(CoordinationError::Unauthorized(format!(
                "{caller} is not part of task {task_id}"
            )));
        }
        Ok(state.task.clone())
    }

    /// Users that have seen the task's terminal status through `wait_task`.
    pub fn observers(&self, task_id: TaskId) -> Result<Vec<UserId>> {
        let cell = self.cell(task_id)?;
        let mut observers: Vec<UserId> = cell.state.lock().observers.iter().cloned().collect();
        observers.sort();
        Ok(observers)
    }

    /// Remove terminal tasks with their entries and unclaimed assignments.
    /// A task goes once every participant has observed its outcome through
    /// `wait_task`, or once the horizon has passed.
    pub fn collect_garbage(&self, now: Instant) -> usize {
        let horizon = self.config.gc_horizon;
        let expired: HashSet<TaskId> = self
            .tasks
            .iter()
            .filter(|cell| cell.value().state.lock().collectable(now, horizon))
            .map(|cell| *cell.key())
            .collect();

        for task_id in &expired {
            self.tasks.remove(task_id);
            self.store.delete_scope(*task_id);
        }
        let dropped = self.dispatcher.discard(&expired);
        if !expired.is_empty() {
            tracing::info!(
                collected = expired.len(),
                unclaimed = dropped,
                "Collected finished tasks"
            );
        }
        expired.len()
    }

    /// Assignments queued for `user_id` and not yet claimed.
    pub fn pending_assignments(&self, user_id: &UserId) -> usize {
        self.dispatcher.pending(user_id)
    }

    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats::default();
        for cell in self.tasks.iter() {
            match cell.value().state.lock().task.status {
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                _ => stats.running += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_types::{Participant, RunOptions};

    struct Fixture {
        manager: TaskManager,
        store: Arc<EntryStore>,
        alice: UserId,
        bob: UserId,
    }

    fn fixture_with(config: TaskManagerConfig) -> Fixture {
        let store = Arc::new(EntryStore::new());
        let manager = TaskManager::new(Arc::clone(&store), config);
        manager
            .declare_protocol(
                ProtocolSpec::new("transfer")
                    .with_role("sender")
                    .with_role("receiver"),
            )
            .unwrap();
        Fixture {
            manager,
            store,
            alice: UserId::parse("alice").unwrap(),
            bob: UserId::parse("bob").unwrap(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(TaskManagerConfig::default())
    }

    fn request(f: &Fixture) -> RunTaskRequest {
        RunTaskRequest::new(
            "transfer",
            b"example.txt".to_vec(),
            vec![
                Participant::new(f.alice.clone(), "sender"),
                Participant::new(f.bob.clone(), "receiver"),
            ],
        )
    }

    const SHORT: Option<Duration> = Some(Duration::from_millis(20));

    #[tokio::test]
    async fn test_run_task_delivers_assignments() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();

        let task = f.manager.get_task(task_id, &f.bob).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(f.store.is_open(task_id));

        let alice_work = f.manager.claim_assignment(&f.alice, SHORT).await.unwrap().unwrap();
        let bob_work = f.manager.claim_assignment(&f.bob, SHORT).await.unwrap().unwrap();
        assert_eq!(alice_work.role, "sender");
        assert_eq!(bob_work.role, "receiver");
        assert_eq!(bob_work.payload, b"example.txt");
        assert_eq!(bob_work.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_run_task_validation() {
        let f = fixture();
        let mut unknown = request(&f);
        unknown.protocol_name = "auction".into();
        assert!(matches!(
            f.manager.run_task(&f.alice, unknown).await,
            Err(CoordinationError::UnknownProtocol(_))
        ));

        let mut incomplete = request(&f);
        incomplete.participants.pop();
        assert!(matches!(
            f.manager.run_task(&f.alice, incomplete).await,
            Err(CoordinationError::InvalidParticipants(_))
        ));
        assert!(f
            .manager
            .claim_assignment(&f.alice, SHORT)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_completes_when_all_succeed() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();

        let status = f
            .manager
            .report_status(task_id, &f.alice, TaskStatus::Completed, None)
            .unwrap();
        assert_eq!(status, TaskStatus::Running);

        let status = f
            .manager
            .report_status(task_id, &f.bob, TaskStatus::Completed, None)
            .unwrap();
        assert_eq!(status, TaskStatus::Completed);

        let task = f.manager.get_task(task_id, &f.alice).unwrap();
        let history: Vec<TaskStatus> = task.transitions.iter().map(|t| t.status).collect();
        assert_eq!(
            history,
            [TaskStatus::Created, TaskStatus::Running, TaskStatus::Completed]
        );
        assert!(task.failure.is_none());
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();

        f.manager
            .report_status(task_id, &f.alice, TaskStatus::Failed, Some("disk full".into()))
            .unwrap();
        assert!(matches!(
            f.manager
                .report_status(task_id, &f.bob, TaskStatus::Completed, None),
            Err(CoordinationError::TaskAlreadyTerminal(_))
        ));

        let task = f.manager.get_task(task_id, &f.bob).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(
            task.failure,
            Some(FailureReason::ParticipantFailed {
                user_id: f.alice.clone(),
                reason: Some("disk full".into()),
            })
        );
    }

    #[tokio::test]
    async fn test_report_rules() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();
        let mallory = UserId::parse("mallory").unwrap();

        assert!(matches!(
            f.manager
                .report_status(task_id, &f.alice, TaskStatus::Running, None),
            Err(CoordinationError::InvalidStatus(_))
        ));
        assert!(matches!(
            f.manager
                .report_status(task_id, &mallory, TaskStatus::Completed, None),
            Err(CoordinationError::Unauthorized(_))
        ));

        f.manager
            .report_status(task_id, &f.alice, TaskStatus::Completed, None)
            .unwrap();
        assert!(matches!(
            f.manager
                .report_status(task_id, &f.alice, TaskStatus::Completed, None),
            Err(CoordinationError::InvalidStatus(_))
        ));
        assert!(matches!(
            f.manager
                .report_status(TaskId::generate(), &f.alice, TaskStatus::Completed, None),
            Err(CoordinationError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_timeout_and_access() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();

        assert!(matches!(
            f.manager.wait_task(task_id, &f.bob, SHORT).await,
            Err(CoordinationError::Timeout(_))
        ));
        assert!(matches!(
            f.manager
                .wait_task(task_id, &UserId::parse("mallory").unwrap(), SHORT)
                .await,
            Err(CoordinationError::Unauthorized(_))
        ));
        assert_eq!(
            f.manager.get_task(task_id, &f.bob).unwrap().status,
            TaskStatus::Running
        );
    }

    #[tokio::test]
    async fn test_wait_records_observer() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();
        f.manager
            .report_status(task_id, &f.bob, TaskStatus::Failed, None)
            .unwrap();

        let status = f.manager.wait_task(task_id, &f.alice, SHORT).await.unwrap();
        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(f.manager.observers(task_id).unwrap(), vec![f.alice.clone()]);
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_participant_alive() {
        let f = fixture();
        let options = RunOptions::default().with_liveness_timeout(Duration::from_millis(300));
        let task_id = f
            .manager
            .run_task(&f.alice, request(&f).with_options(options))
            .await
            .unwrap();

        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(75)).await;
            f.manager.heartbeat(task_id, &f.alice).unwrap();
            f.manager.heartbeat(task_id, &f.bob).unwrap();
        }
        assert_eq!(
            f.manager.get_task(task_id, &f.alice).unwrap().status,
            TaskStatus::Running
        );
    }

    #[tokio::test]
    async fn test_claim_skips_finished_tasks() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();
        f.manager
            .report_status(task_id, &f.alice, TaskStatus::Failed, None)
            .unwrap();

        assert!(f
            .manager
            .claim_assignment(&f.bob, SHORT)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_collect_garbage() {
        let f = fixture_with(TaskManagerConfig {
            gc_horizon: Duration::ZERO,
            ..TaskManagerConfig::default()
        });
        let running = f.manager.run_task(&f.alice, request(&f)).await.unwrap();
        let done = f.manager.run_task(&f.alice, request(&f)).await.unwrap();
        f.manager
            .report_status(done, &f.alice, TaskStatus::Failed, None)
            .unwrap();

        assert_eq!(f.manager.collect_garbage(Instant::now()), 1);
        assert!(matches!(
            f.manager.get_task(done, &f.alice),
            Err(CoordinationError::UnknownTask(_))
        ));
        assert!(!f.store.is_open(done));
        assert!(f.store.is_open(running));
        assert_eq!(
            f.manager.stats(),
            TaskStats {
                running: 1,
                completed: 0,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_collect_garbage_drops_unclaimed_assignments() {
        let f = fixture_with(TaskManagerConfig {
            gc_horizon: Duration::ZERO,
            ..TaskManagerConfig::default()
        });
        for _ in 0..50 {
            let request = RunTaskRequest {
                payload: vec![0u8; 1024],
                ..request(&f)
            };
            let task_id = f.manager.run_task(&f.alice, request).await.unwrap();
            f.manager
                .report_status(task_id, &f.alice, TaskStatus::Failed, None)
                .unwrap();
        }
        assert_eq!(f.manager.pending_assignments(&f.bob), 50);

        assert_eq!(f.manager.collect_garbage(Instant::now()), 50);
        assert_eq!(f.manager.pending_assignments(&f.bob), 0);
        assert_eq!(f.manager.pending_assignments(&f.alice), 0);
        assert_eq!(f.manager.dispatcher.inbox_count(), 0);
    }

    #[tokio::test]
    async fn test_collect_once_every_participant_observed() {
        let f = fixture();
        let task_id = f.manager.run_task(&f.alice, request(&f)).await.unwrap();
        f.manager
            .report_status(task_id, &f.bob, TaskStatus::Failed, None)
            .unwrap();

        f.manager.wait_task(task_id, &f.alice, SHORT).await.unwrap();
        assert_eq!(f.manager.collect_garbage(Instant::now()), 0);

        f.manager.wait_task(task_id, &f.bob, SHORT).await.unwrap();
        assert_eq!(f.manager.collect_garbage(Instant::now()), 1);
        assert!(!f.store.is_open(task_id));
    }
}
