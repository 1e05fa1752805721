//! Step interpreter for declarative role playbooks

use crate::context::ExecutionContext;
use crate::error::{PlaybookError, Result};
use crate::launcher::{Launcher, RunningPlaybook, SpawnedPlaybook};
use crate::process::exit_code;
use crate::spec::{ProcessOutput, ProtocolPlaybook, RolePlaybook, Step, StepAction};
use crate::template::TemplateVars;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tandem_node::{Connector, Node};
use tandem_types::{EntryKey, UserId};
use tokio::process::{Child, Command};

/// Runs a role's `playbook.steps` inside this process, talking to the
/// coordinator through a [`Node`] built from the launch context.
#[derive(Clone)]
pub struct StepLauncher {
    steps: Arc<[Step]>,
    work_dir: Option<String>,
    base_dir: Option<PathBuf>,
    connector: Arc<dyn Connector>,
}

impl StepLauncher {
    pub fn for_role(
        protocol: &ProtocolPlaybook,
        role: &RolePlaybook,
        base_dir: Option<PathBuf>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            steps: role.steps().to_vec().into(),
            work_dir: role.workdir(protocol).map(str::to_string),
            base_dir,
            connector,
        }
    }
}

#[async_trait]
impl Launcher for StepLauncher {
    async fn launch(&self, ctx: ExecutionContext) -> Result<Box<dyn RunningPlaybook>> {
        let node = self.connector.connect(&ctx.endpoint, ctx.credential.clone())?;
        let work_dir = ctx.resolve_work_dir(self.work_dir.as_deref(), self.base_dir.as_deref())?;
        ctx.write_param_file(&work_dir).await?;

        let label = format!("{}:{}", ctx.protocol_name, ctx.role);
        let runner = StepRunner {
            vars: TemplateVars::from_context(&ctx),
            node,
            ctx,
            work_dir,
            processes: HashMap::new(),
        };
        let steps = Arc::clone(&self.steps);
        Ok(Box::new(SpawnedPlaybook::spawn(label, runner.run(steps))))
    }
}

struct StepRunner {
    node: Node,
    ctx: ExecutionContext,
    vars: TemplateVars,
    work_dir: PathBuf,
    /// Background processes by step name; killed on drop
    processes: HashMap<String, Child>,
}

impl StepRunner {
    async fn run(mut self, steps: Arc<[Step]>) -> Result<i32> {
        for (index, step) in steps.iter().enumerate() {
            if let Some(condition) = &step.condition {
                if !succeeds(self.shell(condition)?).await? {
                    tracing::debug!(step = index + 1, "Step condition false, skipping");
                    continue;
                }
            }
            for action in &step.actions {
                self.perform(action)
                    .await
                    .map_err(|e| PlaybookError::Step(format!("step {}: {}", index + 1, e)))?;
            }
        }

        if !self.processes.is_empty() {
            let names: Vec<_> = self.processes.keys().cloned().collect();
            tracing::debug!(?names, "Stopping processes left running by the playbook");
        }
        Ok(0)
    }

    async fn perform(&mut self, action: &StepAction) -> Result<()> {
        match action {
            StepAction::Spawn { step_name, command } => self.spawn(step_name, command),
            StepAction::Collect {
                step_name,
                kill,
                output,
            } => self.collect(step_name, *kill, output).await,
            StepAction::CreateEntry { key, file } => {
                let key = self.entry_key(key)?;
                let value = tokio::fs::read(self.path(file)?).await?;
                self.node.write_entry(&key, value).await?;
                Ok(())
            }
            StepAction::ReadEntry { key, file } => {
                let key = self.entry_key(key)?;
                let entry = self.node.try_read_entry(&key).await?.ok_or_else(|| {
                    PlaybookError::Step(format!("entry {key} has not been written"))
                })?;
                write_file(&self.path(file)?, &entry.value).await
            }
            StepAction::ReadOrWaitEntry { key, file } => {
                let key = self.entry_key(key)?;
                let entry = self.node.read_entry(&key, None).await?;
                write_file(&self.path(file)?, &entry.value).await
            }
            StepAction::SendVariable {
                name,
                file,
                to_role,
                index,
            } => {
                let value = tokio::fs::read(self.path(file)?).await?;
                let receivers: Vec<_> = self
                    .ctx
                    .peers(to_role, *index)?
                    .into_iter()
                    .map(|p| p.user_id.clone())
                    .collect();
                for receiver in &receivers {
                    let key = self.variable_key(name, &self.ctx.user_id, receiver)?;
                    self.node.write_entry(&key, value.clone()).await?;
                }
                tracing::debug!(variable = %name, to_role, receivers = receivers.len(), "Sent variable");
                Ok(())
            }
            StepAction::RecvVariable {
                name,
                file,
                from_role,
                index,
            } => {
                let sender = self.ctx.peers(from_role, Some(*index))?[0].user_id.clone();
                let key = self.variable_key(name, &sender, &self.ctx.user_id)?;
                let entry = self.node.read_entry(&key, None).await?;
                if let Some(file) = file {
                    write_file(&self.path(file)?, &entry.value).await?;
                }
                Ok(())
            }
        }
    }

    /// Task-local entry carrying one variable from `sender` to `receiver`.
    fn variable_key(&self, name: &str, sender: &UserId, receiver: &UserId) -> Result<EntryKey> {
        let name = self.vars.render(name)?;
        Ok(self.node.entry_key(
            &self.ctx.protocol_name,
            self.ctx.task_id,
            &format!("var.{name}@{sender}->{receiver}"),
        )?)
    }

    fn shell(&self, command: &str) -> Result<Command> {
        let mut shell = Command::new("bash");
        shell
            .arg("-c")
            .arg(self.vars.render(command)?)
            .current_dir(&self.work_dir)
            .envs(self.ctx.env_vars())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        Ok(shell)
    }

    fn spawn(&mut self, step_name: &str, command: &str) -> Result<()> {
        if self.processes.contains_key(step_name) {
            return Err(PlaybookError::Step(format!(
                "process {step_name} is already running"
            )));
        }
        let child = self
            .shell(command)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        tracing::debug!(step_name, pid = child.id(), "Spawned step process");
        self.processes.insert(step_name.to_string(), child);
        Ok(())
    }

    async fn collect(&mut self, step_name: &str, kill: bool, output: &ProcessOutput) -> Result<()> {
        let mut child = self
            .processes
            .remove(step_name)
            .ok_or_else(|| PlaybookError::Step(format!("no process named {step_name}")))?;
        if kill {
            if let Err(e) = child.start_kill() {
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    return Err(e.into());
                }
            }
        }

        let finished = child.wait_with_output().await?;
        let code = exit_code(finished.status);

        if let Some(file) = &output.stdout_file {
            write_file(&self.path(file)?, &finished.stdout).await?;
        }
        if let Some(file) = &output.stderr_file {
            write_file(&self.path(file)?, &finished.stderr).await?;
        }
        if let Some(file) = &output.exit_code_file {
            write_file(&self.path(file)?, code.to_string().as_bytes()).await?;
        }

        match output.check_exit_code {
            Some(expected) if expected != code => Err(PlaybookError::Step(format!(
                "process {step_name} exited with {code}, expected {expected}"
            ))),
            _ => Ok(()),
        }
    }

    /// A bare name is local to this task; anything with `:` is a full key.
    fn entry_key(&self, template: &str) -> Result<EntryKey> {
        let rendered = self.vars.render(template)?;
        if rendered.contains(':') {
            Ok(EntryKey::parse(&rendered)?)
        } else {
            Ok(self
                .node
                .entry_key(&self.ctx.protocol_name, self.ctx.task_id, &rendered)?)
        }
    }

    fn path(&self, template: &str) -> Result<PathBuf> {
        Ok(self.work_dir.join(self.vars.render(template)?))
    }
}

/// Run a step condition; true on exit code 0.
async fn succeeds(mut command: Command) -> Result<bool> {
    let status = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.success())
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::spec::PackageSpec;
    use std::time::Duration;
    use tandem_core::{Coordinator, CoordinatorApi};
    use tandem_node::LocalConnector;
    use tandem_types::{Assignment, Identity, Participant, RunTaskRequest, TaskId};

    struct Fixture {
        coordinator: Arc<Coordinator>,
        alice: Identity,
        bob: Identity,
        task_id: TaskId,
    }

    async fn fixture(spec: &tandem_types::ProtocolSpec) -> Fixture {
        let coordinator = Arc::new(Coordinator::in_memory());
        let alice = coordinator.register(None).await.unwrap();
        let bob = coordinator.register(None).await.unwrap();
        coordinator
            .declare_protocol(&alice.credential, spec.clone())
            .await
            .unwrap();
        let task_id = coordinator
            .run_task(
                &alice.credential,
                RunTaskRequest::new(
                    "transfer",
                    b"example.txt".to_vec(),
                    vec![
                        Participant::new(alice.user_id.clone(), "sender"),
                        Participant::new(bob.user_id.clone(), "receiver"),
                    ],
                ),
            )
            .await
            .unwrap();
        Fixture {
            coordinator,
            alice,
            bob,
            task_id,
        }
    }

    async fn claim(coordinator: &Coordinator, identity: &Identity) -> Assignment {
        coordinator
            .claim_assignment(&identity.credential, Some(Duration::from_secs(1)))
            .await
            .unwrap()
            .unwrap()
    }

    const PLAYBOOK: &str = r#"
[package]
use_playbook = true

[transfer]
name = "transfer"
workdir = "{{role}}"

[transfer.roles.sender]
playbook.steps = [
  { create_entry = "file", file = "outbox/example.txt" },
  { if = "false", create_entry = "never", file = "outbox/example.txt" },
]

[transfer.roles.receiver]
playbook.steps = [
  { read_or_wait_entry = "file", file = "inbox/example.txt" },
  { step_name = "count", process = "wc -c < inbox/example.txt", process_wait = "count", stdout_file = "count.txt", exit_code = "count.code", check_exit_code = 0 },
  { step_name = "hang", process = "sleep 30" },
  { process_kill = "hang" },
]
"#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transfer_steps() {
        let package = PackageSpec::parse(PLAYBOOK).unwrap();
        let protocol = package.protocol("transfer").unwrap();
        let f = fixture(&protocol.protocol_spec()).await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sender/outbox")).unwrap();
        std::fs::write(dir.path().join("sender/outbox/example.txt"), "hello").unwrap();

        let connector: Arc<dyn Connector> =
            Arc::new(LocalConnector::new(Arc::clone(&f.coordinator)));
        let launcher = |role: &str| {
            StepLauncher::for_role(
                protocol,
                &protocol.roles[role],
                Some(dir.path().to_path_buf()),
                Arc::clone(&connector),
            )
        };

        // Receiver first: it blocks on the entry.
        let bob_assignment = claim(&f.coordinator, &f.bob).await;
        let bob_ctx = ExecutionContext::for_assignment(&f.bob, &bob_assignment, None, dir.path().into());
        let mut receiver = launcher("receiver").launch(bob_ctx).await.unwrap();

        let alice_assignment = claim(&f.coordinator, &f.alice).await;
        let alice_ctx =
            ExecutionContext::for_assignment(&f.alice, &alice_assignment, None, dir.path().into());
        let mut sender = launcher("sender").launch(alice_ctx).await.unwrap();

        assert_eq!(sender.wait().await.unwrap(), 0);
        assert_eq!(receiver.wait().await.unwrap(), 0);

        let received = dir.path().join("receiver");
        assert_eq!(std::fs::read(received.join("inbox/example.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read_to_string(received.join("count.txt")).unwrap().trim(), "5");
        assert_eq!(std::fs::read_to_string(received.join("count.code")).unwrap(), "0");
        assert!(received.join("param.json").exists());

        let keys = f
            .coordinator
            .list_entries(&f.alice.credential, f.task_id)
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].local_name(), "file");
    }

    #[tokio::test]
    async fn test_failed_exit_check_fails_playbook() {
        let text = r#"
[package]
use_playbook = true

[transfer]
name = "transfer"
[transfer.roles.sender]
playbook.steps = [
  { step_name = "bad", process = "exit 4", process_wait = "bad", check_exit_code = 0 },
]
[transfer.roles.receiver]
command = "true"
"#;
        let package = PackageSpec::parse(text).unwrap();
        let protocol = package.protocol("transfer").unwrap();
        let f = fixture(&protocol.protocol_spec()).await;
        let dir = tempfile::tempdir().unwrap();

        let assignment = claim(&f.coordinator, &f.alice).await;
        let ctx = ExecutionContext::for_assignment(&f.alice, &assignment, None, dir.path().into());
        let launcher = StepLauncher::for_role(
            protocol,
            &protocol.roles["sender"],
            None,
            Arc::new(LocalConnector::new(Arc::clone(&f.coordinator))),
        );
        let mut running = launcher.launch(ctx).await.unwrap();
        assert_eq!(running.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_entry_does_not_wait() {
        let text = r#"
[package]
use_playbook = true

[transfer]
name = "transfer"
[transfer.roles.sender]
command = "true"
[transfer.roles.receiver]
playbook.steps = [{ read_entry = "file", file = "out.txt" }]
"#;
        let package = PackageSpec::parse(text).unwrap();
        let protocol = package.protocol("transfer").unwrap();
        let f = fixture(&protocol.protocol_spec()).await;
        let dir = tempfile::tempdir().unwrap();

        let assignment = claim(&f.coordinator, &f.bob).await;
        let ctx = ExecutionContext::for_assignment(&f.bob, &assignment, None, dir.path().into());
        let launcher = StepLauncher::for_role(
            protocol,
            &protocol.roles["receiver"],
            None,
            Arc::new(LocalConnector::new(Arc::clone(&f.coordinator))),
        );
        let mut running = launcher.launch(ctx).await.unwrap();
        let code = tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, 1);
        assert!(!dir.path().join("out.txt").exists());
    }
}
