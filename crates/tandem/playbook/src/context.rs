//! What a launched playbook is told about its task

use crate::error::{PlaybookError, Result};
use crate::template::TemplateVars;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tandem_types::encoding;
use tandem_types::{Assignment, Credential, Endpoint, Identity, Participant, TaskId, UserId};

/// Environment variable carrying the playbook TOML path
pub const ENV_PLAYBOOK_CONFIG: &str = "TANDEM_PLAYBOOK_CONFIG";
pub const ENV_PROTOCOL: &str = "TANDEM_PROTOCOL";
pub const ENV_ROLE: &str = "TANDEM_ROLE";
pub const ENV_TASK_ID: &str = "TANDEM_TASK_ID";
pub const ENV_USER_ID: &str = "TANDEM_USER_ID";
/// Coordinator endpoint, for programs started by playbook steps
pub const ENV_CORE_ADDR: &str = "TANDEM_CORE_ADDR";
/// Bearer credential, for programs started by playbook steps
pub const ENV_JWT: &str = "TANDEM_JWT";

/// Everything a participant program needs to play its role.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub endpoint: Endpoint,
    pub credential: Credential,
    pub user_id: UserId,
    pub task_id: TaskId,
    pub protocol_name: String,
    pub role: String,
    pub participants: Vec<Participant>,
    pub payload: Vec<u8>,
    /// Protocol-specific configuration file, if any
    pub config_path: Option<PathBuf>,
    /// Default working directory
    pub work_dir: PathBuf,
}

/// Contents of `param.json`
#[derive(Debug, Serialize)]
struct ParamFile<'a> {
    /// Base64 payload
    param: String,
    participants: Vec<(&'a str, &'a str)>,
    user_id: &'a str,
    task_id: String,
}

impl ExecutionContext {
    pub fn for_assignment(
        identity: &Identity,
        assignment: &Assignment,
        config_path: Option<PathBuf>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            endpoint: identity.endpoint.clone(),
            credential: identity.credential.clone(),
            user_id: identity.user_id.clone(),
            task_id: assignment.task_id,
            protocol_name: assignment.protocol_name.clone(),
            role: assignment.role.clone(),
            participants: assignment.participants.clone(),
            payload: assignment.payload.clone(),
            config_path,
            work_dir,
        }
    }

    /// Participants holding `role`, in assignment order.
    pub fn participants_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Participant> {
        self.participants.iter().filter(move |p| p.role == role)
    }

    /// Participants of `role`, narrowed to the `index`-th one when given.
    pub fn peers<'a>(&'a self, role: &'a str, index: Option<usize>) -> Result<Vec<&'a Participant>> {
        let mut peers: Vec<_> = self.participants_with_role(role).collect();
        if let Some(index) = index {
            let peer = *peers.get(index).ok_or_else(|| {
                PlaybookError::Step(format!("role {role} has no participant #{index}"))
            })?;
            peers = vec![peer];
        }
        if peers.is_empty() {
            return Err(PlaybookError::Step(format!("role {role} has no participants")));
        }
        Ok(peers)
    }

    /// `TANDEM_*` variables handed to launched programs.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (ENV_PROTOCOL, self.protocol_name.clone()),
            (ENV_ROLE, self.role.clone()),
            (ENV_TASK_ID, self.task_id.to_string()),
            (ENV_USER_ID, self.user_id.to_string()),
            (ENV_CORE_ADDR, self.endpoint.to_string()),
            (ENV_JWT, self.credential.as_str().to_string()),
        ];
        if let Some(path) = &self.config_path {
            vars.push((ENV_PLAYBOOK_CONFIG, path.display().to_string()));
        }
        vars
    }

    /// Resolve the directory a playbook runs in.
    ///
    /// `template` is rendered; a relative result is taken relative to
    /// `base`, and no template means the context's own work dir.
    pub fn resolve_work_dir(&self, template: Option<&str>, base: Option<&Path>) -> Result<PathBuf> {
        let Some(template) = template else {
            return Ok(self.work_dir.clone());
        };
        let rendered = PathBuf::from(TemplateVars::from_context(self).render(template)?);
        Ok(match base {
            Some(base) if rendered.is_relative() => base.join(rendered),
            _ => rendered,
        })
    }

    /// Write `param.json` into `dir`.
    pub async fn write_param_file(&self, dir: &Path) -> Result<PathBuf> {
        let param = ParamFile {
            param: encoding::encode(&self.payload),
            participants: self
                .participants
                .iter()
                .map(|p| (p.user_id.as_str(), p.role.as_str()))
                .collect(),
            user_id: self.user_id.as_str(),
            task_id: self.task_id.to_string(),
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join("param.json");
        tokio::fs::write(&path, serde_json::to_vec(&param)?).await?;
        Ok(path)
    }
}
