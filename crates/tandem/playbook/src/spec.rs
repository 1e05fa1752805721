//! Playbook TOML
//!
//! ```toml
//! [package]
//! use_playbook = true
//!
//! [transfer]
//! name = "transfer"
//! workdir = "runs/{{task_id}}"
//!
//! [transfer.roles.sender]
//! playbook.steps = [
//!   { create_entry = "file", file = "$DATA_DIR/example.txt" },
//! ]
//!
//! [transfer.roles.receiver]
//! max_num = 4
//! command = "python3 receive.py"
//! ```
//!
//! Every table other than `[package]` declares one protocol. A role either
//! names an external `command` or lists interpreter `playbook.steps`.

use crate::error::{PlaybookError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tandem_types::ProtocolSpec;

/// All protocols one playbook file serves.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub protocols: Vec<ProtocolPlaybook>,
    /// Directory relative work dirs are resolved against
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolPlaybook {
    pub name: String,
    #[serde(default)]
    pub workdir: Option<String>,
    pub roles: BTreeMap<String, RolePlaybook>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolePlaybook {
    #[serde(default)]
    pub min_num: Option<u32>,
    #[serde(default)]
    pub max_num: Option<u32>,
    /// External program run with `--addr`/`--jwt`
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub playbook: Option<StepList>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepList {
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default, rename = "steps")]
    raw_steps: Vec<RawStep>,
    #[serde(skip)]
    pub steps: Vec<Step>,
}

/// One step as written in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    #[serde(rename = "if")]
    condition: Option<String>,
    step_name: Option<String>,
    process: Option<String>,
    process_wait: Option<String>,
    process_kill: Option<String>,
    check_exit_code: Option<i32>,
    stdout_file: Option<String>,
    stderr_file: Option<String>,
    exit_code: Option<String>,
    file: Option<String>,
    create_entry: Option<String>,
    read_entry: Option<String>,
    read_or_wait_entry: Option<String>,
    update_entry: Option<String>,
    delete_entry: Option<String>,
    send_variable: Option<String>,
    recv_variable: Option<String>,
    to_role: Option<String>,
    from_role: Option<String>,
    index: Option<usize>,
}

/// A validated step: an optional shell condition and what to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Shell command; the step is skipped when it exits nonzero
    pub condition: Option<String>,
    pub actions: Vec<StepAction>,
}

/// Where a finished step process's results go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout_file: Option<String>,
    pub stderr_file: Option<String>,
    pub exit_code_file: Option<String>,
    pub check_exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// `bash -c <command>` in the background, remembered as `step_name`
    Spawn { step_name: String, command: String },
    /// Wait for a spawned process, killing it first if `kill`
    Collect {
        step_name: String,
        kill: bool,
        output: ProcessOutput,
    },
    /// File contents -> entry
    CreateEntry { key: String, file: String },
    /// Entry -> file; fails if not yet written
    ReadEntry { key: String, file: String },
    /// Entry -> file, waiting for the write
    ReadOrWaitEntry { key: String, file: String },
    /// File contents -> every participant of `to_role`, or only its
    /// `index`-th one
    SendVariable {
        name: String,
        file: String,
        to_role: String,
        index: Option<usize>,
    },
    /// Wait for the variable sent by the `index`-th participant of
    /// `from_role`, optionally saving it to `file`
    RecvVariable {
        name: String,
        file: Option<String>,
        from_role: String,
        index: usize,
    },
}

impl StepAction {
    /// Role this action addresses, if any.
    pub fn peer_role(&self) -> Option<&str> {
        match self {
            StepAction::SendVariable { to_role, .. } => Some(to_role),
            StepAction::RecvVariable { from_role, .. } => Some(from_role),
            _ => None,
        }
    }
}

impl PackageSpec {
    pub fn parse(text: &str) -> Result<Self> {
        let root: toml::Table = text.parse()?;

        let use_playbook = root
            .get("package")
            .and_then(|package| package.get("use_playbook"))
            .and_then(toml::Value::as_bool)
            .unwrap_or(false);
        if !use_playbook {
            return Err(PlaybookError::Spec(
                "[package] use_playbook must be set to true".to_string(),
            ));
        }

        let mut protocols = Vec::new();
        for (table_name, value) in root {
            if table_name == "package" || !value.is_table() {
                continue;
            }
            let mut protocol: ProtocolPlaybook = value.try_into()?;
            protocol.validate()?;
            tracing::debug!(table = %table_name, protocol = %protocol.name, "Parsed protocol playbook");
            protocols.push(protocol);
        }

        if protocols.is_empty() {
            return Err(PlaybookError::Spec("no protocol tables".to_string()));
        }
        Ok(Self {
            protocols,
            base_dir: None,
        })
    }

    /// Read and parse a playbook file; relative work dirs resolve against
    /// its directory.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let mut spec = Self::parse(&text)?;
        spec.base_dir = path.parent().map(Path::to_path_buf);
        Ok(spec)
    }

    pub fn protocol(&self, name: &str) -> Option<&ProtocolPlaybook> {
        self.protocols.iter().find(|p| p.name == name)
    }
}

impl ProtocolPlaybook {
    fn validate(&mut self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(PlaybookError::Spec(format!(
                "protocol {} declares no roles",
                self.name
            )));
        }
        for (role, playbook) in &mut self.roles {
            playbook
                .validate()
                .map_err(|e| PlaybookError::Spec(format!("{}.{}: {}", self.name, role, e)))?;
        }
        for (role, playbook) in &self.roles {
            let peers = playbook.steps().iter().flat_map(|step| &step.actions);
            if let Some(unknown) = peers
                .filter_map(StepAction::peer_role)
                .find(|peer| !self.roles.contains_key(*peer))
            {
                return Err(PlaybookError::Spec(format!(
                    "{}.{}: unknown role {unknown}",
                    self.name, role
                )));
            }
        }
        self.protocol_spec().validate()?;
        Ok(())
    }

    /// Role requirements to declare. An unset `min_num` means one, an unset
    /// `max_num` means `max(min_num, 1)`.
    pub fn protocol_spec(&self) -> ProtocolSpec {
        self.roles
            .iter()
            .fold(ProtocolSpec::new(&self.name), |spec, (role, playbook)| {
                let (min, max) = playbook.bounds();
                spec.with_role_range(role, min, max)
            })
    }
}

impl RolePlaybook {
    pub fn bounds(&self) -> (u32, u32) {
        let min = self.min_num.unwrap_or(1);
        let max = self.max_num.unwrap_or(min.max(1));
        (min, max)
    }

    /// Directory template for this role, falling back to the protocol's.
    pub fn workdir<'a>(&'a self, protocol: &'a ProtocolPlaybook) -> Option<&'a str> {
        self.playbook
            .as_ref()
            .and_then(|p| p.workdir.as_deref())
            .or(protocol.workdir.as_deref())
    }

    pub fn steps(&self) -> &[Step] {
        self.playbook.as_ref().map(|p| p.steps.as_slice()).unwrap_or_default()
    }

    fn validate(&mut self) -> std::result::Result<(), String> {
        let has_steps = self
            .playbook
            .as_ref()
            .is_some_and(|p| !p.raw_steps.is_empty());
        match (&self.command, has_steps) {
            (Some(_), true) => return Err("use either `command` or `playbook.steps`, not both".into()),
            (None, false) => return Err("needs a `command` or `playbook.steps`".into()),
            _ => {}
        }
        if let Some(playbook) = &mut self.playbook {
            playbook.steps = playbook
                .raw_steps
                .iter()
                .enumerate()
                .map(|(i, raw)| raw.validate().map_err(|e| format!("step {}: {}", i + 1, e)))
                .collect::<std::result::Result<_, _>>()?;
        }
        Ok(())
    }
}

impl RawStep {
    fn validate(&self) -> std::result::Result<Step, String> {
        if self.update_entry.is_some() || self.delete_entry.is_some() {
            return Err("entries are write-once; `update_entry` and `delete_entry` are not supported".into());
        }

        let output = ProcessOutput {
            stdout_file: self.stdout_file.clone(),
            stderr_file: self.stderr_file.clone(),
            exit_code_file: self.exit_code.clone(),
            check_exit_code: self.check_exit_code,
        };
        let mut actions = Vec::new();

        if let Some(command) = &self.process {
            let step_name = self
                .step_name
                .clone()
                .ok_or("`process` needs a `step_name`")?;
            actions.push(StepAction::Spawn {
                step_name,
                command: command.clone(),
            });
        }
        match (&self.process_kill, &self.process_wait) {
            (Some(_), Some(_)) => return Err("`process_kill` and `process_wait` are exclusive".into()),
            (Some(name), None) | (None, Some(name)) => actions.push(StepAction::Collect {
                step_name: name.clone(),
                kill: self.process_kill.is_some(),
                output,
            }),
            (None, None) => {}
        }

        let entry_actions = [
            self.create_entry.as_ref().map(|key| (key, 0)),
            self.read_entry.as_ref().map(|key| (key, 1)),
            self.read_or_wait_entry.as_ref().map(|key| (key, 2)),
        ];
        let mut entry_actions = entry_actions.into_iter().flatten();
        if let Some((key, kind)) = entry_actions.next() {
            if entry_actions.next().is_some() || !actions.is_empty() {
                return Err("a step takes one action".into());
            }
            let file = self.file.clone().ok_or("entry steps need a `file`")?;
            let key = key.clone();
            actions.push(match kind {
                0 => StepAction::CreateEntry { key, file },
                1 => StepAction::ReadEntry { key, file },
                _ => StepAction::ReadOrWaitEntry { key, file },
            });
        }

        if let Some(name) = &self.send_variable {
            if !actions.is_empty() || self.recv_variable.is_some() {
                return Err("a step takes one action".into());
            }
            actions.push(StepAction::SendVariable {
                name: name.clone(),
                file: self.file.clone().ok_or("`send_variable` needs a `file`")?,
                to_role: self.to_role.clone().ok_or("`send_variable` needs a `to_role`")?,
                index: self.index,
            });
        } else if let Some(name) = &self.recv_variable {
            if !actions.is_empty() {
                return Err("a step takes one action".into());
            }
            actions.push(StepAction::RecvVariable {
                name: name.clone(),
                file: self.file.clone(),
                from_role: self
                    .from_role
                    .clone()
                    .ok_or("`recv_variable` needs a `from_role`")?,
                index: self.index.unwrap_or(0),
            });
        } else if self.to_role.is_some() || self.from_role.is_some() || self.index.is_some() {
            return Err("`to_role`, `from_role` and `index` belong to variable steps".into());
        }

        if actions.is_empty() {
            return Err("no action".into());
        }
        Ok(Step {
            condition: self.condition.clone(),
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER: &str = r#"
[package]
use_playbook = true

[transfer]
name = "transfer"
workdir = "runs/{{task_id}}"

[transfer.roles.sender]
playbook.steps = [
  { create_entry = "file", file = "example.txt" },
  { if = "test -f done", step_name = "log", process = "echo sent", process_wait = "log", stdout_file = "log.txt", check_exit_code = 0 },
]

[transfer.roles.receiver]
min_num = 1
max_num = 3
command = "python3 receive.py"
"#;

    #[test]
    fn test_parse_transfer() {
        let package = PackageSpec::parse(TRANSFER).unwrap();
        let protocol = package.protocol("transfer").unwrap();

        let sender = &protocol.roles["sender"];
        assert_eq!(sender.workdir(protocol), Some("runs/{{task_id}}"));
        assert_eq!(sender.steps().len(), 2);
        assert_eq!(
            sender.steps()[0].actions,
            vec![StepAction::CreateEntry {
                key: "file".into(),
                file: "example.txt".into()
            }]
        );

        let spawn_and_wait = &sender.steps()[1];
        assert_eq!(spawn_and_wait.condition.as_deref(), Some("test -f done"));
        assert_eq!(spawn_and_wait.actions.len(), 2);
        assert!(matches!(
            &spawn_and_wait.actions[1],
            StepAction::Collect { step_name, kill: false, output }
                if step_name == "log" && output.check_exit_code == Some(0)
        ));

        let receiver = &protocol.roles["receiver"];
        assert_eq!(receiver.command.as_deref(), Some("python3 receive.py"));
        assert!(receiver.steps().is_empty());
    }

    #[test]
    fn test_protocol_spec_from_role_bounds() {
        let package = PackageSpec::parse(TRANSFER).unwrap();
        let spec = package.protocol("transfer").unwrap().protocol_spec();
        assert_eq!(spec.name, "transfer");
        let receiver = spec.role("receiver").unwrap();
        assert_eq!((receiver.min, receiver.max), (1, 3));
        let sender = spec.role("sender").unwrap();
        assert_eq!((sender.min, sender.max), (1, 1));
    }

    #[test]
    fn test_requires_use_playbook() {
        let text = TRANSFER.replace("use_playbook = true", "use_playbook = false");
        assert!(matches!(
            PackageSpec::parse(&text),
            Err(PlaybookError::Spec(_))
        ));
    }

    #[test]
    fn test_rejects_entry_mutation() {
        let text = r#"
[package]
use_playbook = true

[p]
name = "p"
[p.roles.a]
playbook.steps = [{ update_entry = "k", file = "f" }]
"#;
        let err = PackageSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("write-once"));
    }

    #[test]
    fn test_rejects_process_without_name() {
        let text = r#"
[package]
use_playbook = true

[p]
name = "p"
[p.roles.a]
playbook.steps = [{ process = "sleep 1" }]
"#;
        assert!(PackageSpec::parse(text)
            .unwrap_err()
            .to_string()
            .contains("step_name"));
    }

    #[test]
    fn test_rejects_unknown_step_keys() {
        let text = r#"
[package]
use_playbook = true

[p]
name = "p"
[p.roles.a]
playbook.steps = [{ send_message = "x", file = "f" }]
"#;
        assert!(matches!(
            PackageSpec::parse(text),
            Err(PlaybookError::Toml(_))
        ));
    }

    #[test]
    fn test_role_needs_command_or_steps() {
        let text = r#"
[package]
use_playbook = true

[p]
name = "p"
[p.roles.a]
min_num = 1
"#;
        assert!(matches!(
            PackageSpec::parse(text),
            Err(PlaybookError::Spec(_))
        ));
    }

    const EXCHANGE: &str = r#"
[package]
use_playbook = true

[ping]
name = "ping"

[ping.roles.client]
playbook.steps = [
  { send_variable = "question", file = "q.txt", to_role = "server" },
  { recv_variable = "answer", file = "a.txt", from_role = "server" },
]

[ping.roles.server]
max_num = 2
playbook.steps = [
  { recv_variable = "question", from_role = "client", index = 0 },
  { send_variable = "answer", file = "a.txt", to_role = "client", index = 0 },
]
"#;

    #[test]
    fn test_parse_variable_steps() {
        let package = PackageSpec::parse(EXCHANGE).unwrap();
        let protocol = package.protocol("ping").unwrap();
        assert_eq!(
            protocol.roles["client"].steps()[0].actions,
            vec![StepAction::SendVariable {
                name: "question".into(),
                file: "q.txt".into(),
                to_role: "server".into(),
                index: None,
            }]
        );
        assert_eq!(
            protocol.roles["server"].steps()[0].actions,
            vec![StepAction::RecvVariable {
                name: "question".into(),
                file: None,
                from_role: "client".into(),
                index: 0,
            }]
        );
    }

    #[test]
    fn test_variable_step_needs_known_role() {
        let text = EXCHANGE.replace(r#"to_role = "server" }"#, r#"to_role = "proxy" }"#);
        let err = PackageSpec::parse(&text).unwrap_err();
        assert!(err.to_string().contains("unknown role proxy"));
    }

    #[test]
    fn test_variable_fields_need_variable_step() {
        let text = r#"
[package]
use_playbook = true

[p]
name = "p"
[p.roles.a]
playbook.steps = [{ create_entry = "k", file = "f", to_role = "a" }]
"#;
        assert!(PackageSpec::parse(text)
            .unwrap_err()
            .to_string()
            .contains("variable steps"));

        let text = text.replace(r#"create_entry = "k", file = "f", to_role = "a""#, r#"send_variable = "v", to_role = "a""#);
        assert!(PackageSpec::parse(&text)
            .unwrap_err()
            .to_string()
            .contains("needs a `file`"));
    }
}
