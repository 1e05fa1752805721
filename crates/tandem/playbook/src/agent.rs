//! Participant agent: claim assignments, launch, heartbeat, report

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::launcher::Launcher;
use crate::process::ProcessLauncher;
use crate::spec::PackageSpec;
use crate::steps::StepLauncher;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tandem_node::{Connector, Node};
use tandem_types::{Assignment, CoordinationError, ProtocolSpec, TaskStatus};
use tokio::task::JoinSet;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Per-task work dirs are created under this directory
    pub work_root: PathBuf,
    /// Handed to launched programs as `TANDEM_PLAYBOOK_CONFIG`
    pub config_path: Option<PathBuf>,
    /// Longest single wait for the next assignment
    pub claim_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            work_root: PathBuf::from("."),
            config_path: None,
            claim_timeout: Duration::from_secs(30),
        }
    }
}

/// Serves the roles one identity plays.
///
/// A role's program starts only after its assignment arrives, which the
/// coordinator sends once the task's roles are committed.
pub struct ParticipantAgent {
    node: Node,
    config: AgentConfig,
    protocols: BTreeMap<String, ProtocolSpec>,
    launchers: BTreeMap<(String, String), Arc<dyn Launcher>>,
}

impl ParticipantAgent {
    pub fn new(node: Node, config: AgentConfig) -> Self {
        Self {
            node,
            config,
            protocols: BTreeMap::new(),
            launchers: BTreeMap::new(),
        }
    }

    /// Builder: serve `role` of `protocol` with `launcher`.
    pub fn with_role(
        mut self,
        protocol: &ProtocolSpec,
        role: impl Into<String>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        self.protocols
            .insert(protocol.name.clone(), protocol.clone());
        self.launchers
            .insert((protocol.name.clone(), role.into()), launcher);
        self
    }

    /// Serve every role of a playbook file: external `command` roles through
    /// a [`ProcessLauncher`], step roles through a [`StepLauncher`].
    pub fn from_package(
        node: Node,
        package: &PackageSpec,
        connector: Arc<dyn Connector>,
        config: AgentConfig,
    ) -> Self {
        let mut agent = Self::new(node, config);
        for protocol in &package.protocols {
            let spec = protocol.protocol_spec();
            for (role, playbook) in &protocol.roles {
                let launcher: Arc<dyn Launcher> = match &playbook.command {
                    Some(command) => Arc::new(ProcessLauncher::shell(command).work_dir(
                        playbook.workdir(protocol).map(str::to_string),
                        package.base_dir.clone(),
                    )),
                    None => Arc::new(StepLauncher::for_role(
                        protocol,
                        playbook,
                        package.base_dir.clone(),
                        Arc::clone(&connector),
                    )),
                };
                agent = agent.with_role(&spec, role.clone(), launcher);
            }
        }
        agent
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Declare every protocol this agent serves.
    pub async fn declare_protocols(&self) -> Result<()> {
        for spec in self.protocols.values() {
            let created = self.node.declare_protocol(spec.clone()).await?;
            tracing::info!(protocol = %spec.name, created, "Declared protocol");
        }
        Ok(())
    }

    /// Claim and play assignments until `shutdown` resolves. Playbooks still
    /// running at shutdown are stopped.
    pub async fn run<F>(self: Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.declare_protocols().await?;
        tracing::info!(
            user_id = %self.node.user_id(),
            roles = self.launchers.len(),
            "Participant agent started"
        );

        tokio::pin!(shutdown);
        let mut running = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                claimed = self.node.claim_assignment(Some(self.config.claim_timeout)) => {
                    match claimed {
                        Ok(Some(assignment)) => {
                            let agent = Arc::clone(&self);
                            running.spawn(async move { agent.play(assignment).await });
                        }
                        Ok(None) => {}
                        Err(e @ CoordinationError::Unauthorized(_)) => return Err(e.into()),
                        Err(e) => {
                            tracing::warn!(error = %e, "Claiming assignment failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
            while let Some(finished) = running.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Assignment handler panicked");
                }
            }
        }

        tracing::info!(active = running.len(), "Participant agent stopping");
        running.shutdown().await;
        Ok(())
    }

    /// Claim at most one assignment and play it to the end.
    pub async fn run_once(&self, timeout: Option<Duration>) -> Result<Option<TaskStatus>> {
        match self.node.claim_assignment(timeout).await? {
            Some(assignment) => Ok(Some(self.play(assignment).await)),
            None => Ok(None),
        }
    }

    /// Launch the role's program, heartbeat while it runs and report its
    /// outcome. Returns the status reported by this participant.
    pub async fn play(&self, assignment: Assignment) -> TaskStatus {
        let task_id = assignment.task_id;
        let outcome = self.launch_and_wait(&assignment).await;

        let (status, reason) = match outcome {
            Outcome::Exited(0) => (TaskStatus::Completed, None),
            Outcome::Exited(code) => (TaskStatus::Failed, Some(format!("exit code {code}"))),
            Outcome::Error(reason) => (TaskStatus::Failed, Some(reason)),
            Outcome::Abandoned => return TaskStatus::Failed,
        };

        tracing::info!(task_id = %task_id, role = %assignment.role, status = %status, "Reporting playbook outcome");
        match self.node.report_status(task_id, status, reason).await {
            Ok(_) => {}
            Err(
                e @ (CoordinationError::TaskAlreadyTerminal(_)
                | CoordinationError::LivenessTimeout(_)
                | CoordinationError::UnknownTask(_)),
            ) => {
                tracing::debug!(task_id = %task_id, error = %e, "Task ended before report");
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Reporting status failed");
            }
        }
        status
    }

    async fn launch_and_wait(&self, assignment: &Assignment) -> Outcome {
        let key = (assignment.protocol_name.clone(), assignment.role.clone());
        let Some(launcher) = self.launchers.get(&key) else {
            return Outcome::Error(format!(
                "no playbook for role {} of {}",
                assignment.role, assignment.protocol_name
            ));
        };

        let work_dir = self
            .config
            .work_root
            .join(assignment.task_id.to_string())
            .join(&assignment.role);
        let ctx = ExecutionContext::for_assignment(
            self.node.identity(),
            assignment,
            self.config.config_path.clone(),
            work_dir,
        );

        let mut running = match launcher.launch(ctx).await {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!(task_id = %assignment.task_id, error = %e, "Launch failed");
                return Outcome::Error(e.to_string());
            }
        };

        let mut heartbeat = tokio::time::interval(heartbeat_interval(assignment.liveness_timeout()));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let finished = {
            let wait = running.wait();
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    result = &mut wait => break Some(result),
                    _ = heartbeat.tick() => {
                        match self.node.heartbeat(assignment.task_id).await {
                            Ok(()) => {}
                            Err(
                                CoordinationError::TaskAlreadyTerminal(_)
                                | CoordinationError::LivenessTimeout(_)
                                | CoordinationError::UnknownTask(_),
                            ) => break None,
                            Err(e) => tracing::warn!(task_id = %assignment.task_id, error = %e, "Heartbeat failed"),
                        }
                    }
                }
            }
        };

        match finished {
            Some(Ok(code)) => Outcome::Exited(code),
            Some(Err(e)) => Outcome::Error(e.to_string()),
            None => {
                tracing::info!(task_id = %assignment.task_id, "Task ended elsewhere, stopping playbook");
                if let Err(e) = running.terminate().await {
                    tracing::warn!(task_id = %assignment.task_id, error = %e, "Terminating playbook failed");
                }
                Outcome::Abandoned
            }
        }
    }
}

enum Outcome {
    Exited(i32),
    Error(String),
    /// The task became terminal while the playbook ran
    Abandoned,
}

/// A third of the liveness window, so one lost heartbeat is survivable.
fn heartbeat_interval(liveness: Duration) -> Duration {
    (liveness / 3).max(Duration::from_millis(10))
}
