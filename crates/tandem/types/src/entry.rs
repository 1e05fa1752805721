//! Task-scoped, write-once entries.

use crate::encoding::base64_bytes;
use crate::error::{CoordinationError, Result};
use crate::ids::{TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `<protocol_name>:<task_id>:<local_name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    protocol: String,
    task_id: TaskId,
    local_name: String,
}

impl EntryKey {
    pub fn new(protocol: impl Into<String>, task_id: TaskId, local_name: impl Into<String>) -> Result<Self> {
        let protocol = protocol.into();
        let local_name = local_name.into();
        check_component("protocol name", &protocol)?;
        check_component("local name", &local_name)?;
        Ok(Self {
            protocol,
            task_id,
            local_name,
        })
    }

    /// Parse the textual form. Exactly three non-empty components.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(CoordinationError::InvalidEntryKey(format!(
                "{text:?} is not <protocol>:<task_id>:<name>"
            )));
        }
        let task_id = TaskId::parse(parts[1])
            .map_err(|_| CoordinationError::InvalidEntryKey(format!("{text:?} has no valid task id")))?;
        Self::new(parts[0], task_id, parts[2])
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

fn check_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(':') {
        return Err(CoordinationError::InvalidEntryKey(format!(
            "{what} {value:?} must be non-empty and contain no ':'"
        )));
    }
    Ok(())
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.protocol, self.task_id, self.local_name)
    }
}

impl FromStr for EntryKey {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for EntryKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// A value written into a task scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: EntryKey,
    pub scope: TaskId,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    pub written_by: UserId,
    pub written_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_and_parse() {
        let task = TaskId::generate();
        let key = EntryKey::new("transfer", task, "receive_file_content").unwrap();
        assert_eq!(key.to_string(), format!("transfer:{task}:receive_file_content"));
        assert_eq!(EntryKey::parse(&key.to_string()).unwrap(), key);
    }

    #[test]
    fn test_rejects_malformed_keys() {
        let task = TaskId::generate();
        for text in [
            String::new(),
            "transfer".to_string(),
            format!("transfer:{task}"),
            format!(":{task}:file"),
            format!("transfer:{task}:"),
            format!("transfer:{task}:a:b"),
            "transfer:not-a-uuid:file".to_string(),
        ] {
            assert!(
                matches!(EntryKey::parse(&text), Err(CoordinationError::InvalidEntryKey(_))),
                "{text:?} should be rejected"
            );
        }
        assert!(EntryKey::new("a:b", task, "x").is_err());
    }

    #[test]
    fn test_entry_json() {
        let task = TaskId::generate();
        let entry = Entry {
            key: EntryKey::new("transfer", task, "file").unwrap(),
            scope: task,
            value: b"hello".to_vec(),
            written_by: UserId::parse("alice").unwrap(),
            written_at: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["key"], format!("transfer:{task}:file"));
        assert_eq!(json["value"], "aGVsbG8=");
    }

    proptest! {
        #[test]
        fn prop_valid_components_round_trip(
            protocol in "[a-z_][a-z0-9_]{0,15}",
            name in "[A-Za-z0-9_./-]{1,24}",
        ) {
            let key = EntryKey::new(protocol, TaskId::generate(), name).unwrap();
            prop_assert_eq!(EntryKey::parse(&key.to_string()).unwrap(), key);
        }

        #[test]
        fn prop_parse_never_panics(text in ".{0,64}") {
            let _ = EntryKey::parse(&text);
        }
    }
}
