//! External-program launcher

use crate::context::ExecutionContext;
use crate::error::{PlaybookError, Result};
use crate::launcher::{Launcher, RunningPlaybook};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Starts one program per assignment as
/// `<program> <args...> --addr <endpoint> --jwt <credential>`, with the
/// `TANDEM_*` variables set and the context's work dir as cwd.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    work_dir: Option<String>,
    base_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
            base_dir: None,
        }
    }

    /// Run a shell command line; the launch arguments follow it as `"$@"`.
    pub fn shell(command: &str) -> Self {
        Self::new("bash").args([
            "-c".to_string(),
            format!("{command} \"$@\""),
            "tandem-playbook".to_string(),
        ])
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Work dir template, relative to `base_dir` when not absolute.
    pub fn work_dir(mut self, template: Option<String>, base_dir: Option<PathBuf>) -> Self {
        self.work_dir = template;
        self.base_dir = base_dir;
        self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, ctx: ExecutionContext) -> Result<Box<dyn RunningPlaybook>> {
        let work_dir = ctx.resolve_work_dir(self.work_dir.as_deref(), self.base_dir.as_deref())?;
        ctx.write_param_file(&work_dir).await?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--addr")
            .arg(ctx.endpoint.as_str())
            .arg("--jwt")
            .arg(ctx.credential.as_str())
            .envs(ctx.env_vars())
            .current_dir(&work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            PlaybookError::Launch(format!("{}: {}", self.program.display(), e))
        })?;

        tracing::info!(
            task_id = %ctx.task_id,
            role = %ctx.role,
            program = %self.program.display(),
            pid = child.id(),
            "Launched playbook process"
        );

        Ok(Box::new(RunningProcess { child }))
    }
}

/// A launched child process; killed when dropped.
struct RunningProcess {
    child: Child,
}

#[async_trait]
impl RunningPlaybook for RunningProcess {
    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        Ok(exit_code(status))
    }

    async fn terminate(&mut self) -> Result<()> {
        match self.child.start_kill() {
            Ok(()) => {
                self.child.wait().await?;
                Ok(())
            }
            // Already reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exit code, or the signal number for a signalled process.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use std::time::Duration;

    #[tokio::test]
    async fn test_program_receives_arguments_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("check.sh"),
            r#"test "$1" = --addr && test "$3" = --jwt && echo "$TANDEM_ROLE $TANDEM_PROTOCOL $2" > seen.txt"#,
        )
        .unwrap();
        let ctx = context(dir.path());
        let launcher = ProcessLauncher::shell("sh check.sh");

        let mut running = launcher.launch(ctx).await.unwrap();
        assert_eq!(running.wait().await.unwrap(), 0);

        let seen = std::fs::read_to_string(dir.path().join("seen.txt")).unwrap();
        assert_eq!(seen.trim(), "sender transfer http://127.0.0.1:7070");
    }

    #[tokio::test]
    async fn test_nonzero_exit_and_work_dir_template() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let launcher = ProcessLauncher::new("bash")
            .args(["-c", "touch marker; exit 7"])
            .work_dir(Some("{{role}}".into()), Some(dir.path().to_path_buf()));

        let mut running = launcher.launch(ctx).await.unwrap();
        assert_eq!(running.wait().await.unwrap(), 7);
        assert!(dir.path().join("sender").join("marker").exists());
    }

    #[tokio::test]
    async fn test_terminate_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut running = ProcessLauncher::new("bash")
            .args(["-c", "sleep 30"])
            .launch(context(dir.path()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), running.terminate())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new(dir.path().join("does-not-exist"));
        assert!(matches!(
            launcher.launch(context(dir.path())).await,
            Err(PlaybookError::Launch(_))
        ));
    }
}
