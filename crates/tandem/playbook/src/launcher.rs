//! Launcher seam and the in-process launcher

use crate::context::ExecutionContext;
use crate::error::{PlaybookError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tandem_node::{Connector, Node};
use tokio::task::JoinHandle;

/// Starts a participant's program for one assignment.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, ctx: ExecutionContext) -> Result<Box<dyn RunningPlaybook>>;
}

/// A launched program.
///
/// Dropping it stops the program.
#[async_trait]
pub trait RunningPlaybook: Send {
    /// Exit code once the program ends; 0 is success.
    async fn wait(&mut self) -> Result<i32>;

    /// Force-stop the program.
    async fn terminate(&mut self) -> Result<()>;
}

/// A playbook running as a tokio task.
pub(crate) struct SpawnedPlaybook {
    handle: JoinHandle<Result<i32>>,
    label: String,
}

impl SpawnedPlaybook {
    pub(crate) fn spawn<F>(label: String, future: F) -> Self
    where
        F: Future<Output = Result<i32>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
            label,
        }
    }
}

#[async_trait]
impl RunningPlaybook for SpawnedPlaybook {
    async fn wait(&mut self) -> Result<i32> {
        match (&mut self.handle).await {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(e)) => {
                tracing::warn!(playbook = %self.label, error = %e, "Playbook failed");
                Ok(1)
            }
            Err(e) if e.is_cancelled() => Err(PlaybookError::Launch(format!(
                "{} was terminated",
                self.label
            ))),
            Err(e) => Err(PlaybookError::Launch(format!("{} panicked: {}", self.label, e))),
        }
    }

    async fn terminate(&mut self) -> Result<()> {
        self.handle.abort();
        Ok(())
    }
}

impl Drop for SpawnedPlaybook {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Handler = Arc<dyn Fn(Node, ExecutionContext) -> BoxFuture<'static, i32> + Send + Sync>;

/// Runs an async closure as the participant's program.
///
/// ```ignore
/// let launcher = InProcessLauncher::new(connector, |node, ctx| async move {
///     match node.entry_key(&ctx.protocol_name, ctx.task_id, "file") {
///         Ok(key) if node.write_entry(&key, ctx.payload).await.is_ok() => 0,
///         _ => 1,
///     }
/// });
/// ```
#[derive(Clone)]
pub struct InProcessLauncher {
    connector: Arc<dyn Connector>,
    handler: Handler,
}

impl InProcessLauncher {
    pub fn new<F, Fut>(connector: Arc<dyn Connector>, handler: F) -> Self
    where
        F: Fn(Node, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = i32> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |node: Node, ctx: ExecutionContext| -> BoxFuture<'static, i32> {
                Box::pin(handler(node, ctx))
            },
        );
        Self { connector, handler }
    }
}

#[async_trait]
impl Launcher for InProcessLauncher {
    async fn launch(&self, ctx: ExecutionContext) -> Result<Box<dyn RunningPlaybook>> {
        let node = self.connector.connect(&ctx.endpoint, ctx.credential.clone())?;
        let label = format!("{}:{}", ctx.protocol_name, ctx.role);
        let future = (self.handler)(node, ctx);
        Ok(Box::new(SpawnedPlaybook::spawn(label, async move {
            Ok(future.await)
        })))
    }
}
