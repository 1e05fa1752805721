//! Protocol declarations: which roles a protocol expects and how many
//! participants may fill each role.

use crate::error::{CoordinationError, Result};
use crate::task::Participant;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How many participants one role accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirement {
    pub name: String,
    pub min: u32,
    pub max: u32,
}

impl RoleRequirement {
    /// Exactly one participant.
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min: 1,
            max: 1,
        }
    }

    pub fn range(name: impl Into<String>, min: u32, max: u32) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }
}

/// Role requirements of a named protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSpec {
    pub name: String,
    pub roles: Vec<RoleRequirement>,
}

impl ProtocolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    /// Builder: add a role that takes exactly one participant.
    pub fn with_role(mut self, name: impl Into<String>) -> Self {
        self.roles.push(RoleRequirement::single(name));
        self
    }

    /// Builder: add a role with explicit bounds.
    pub fn with_role_range(mut self, name: impl Into<String>, min: u32, max: u32) -> Self {
        self.roles.push(RoleRequirement::range(name, min, max));
        self
    }

    pub fn role(&self, name: &str) -> Option<&RoleRequirement> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Check the declaration itself.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(':') {
            return Err(CoordinationError::InvalidRequest(format!(
                "protocol name {:?} must be non-empty and contain no ':'",
                self.name
            )));
        }
        if self.roles.is_empty() {
            return Err(CoordinationError::InvalidRequest(format!(
                "protocol {} declares no roles",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if role.name.is_empty() {
                return Err(CoordinationError::InvalidRequest(format!(
                    "protocol {} has a role with an empty name",
                    self.name
                )));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(CoordinationError::InvalidRequest(format!(
                    "protocol {} declares role {} twice",
                    self.name, role.name
                )));
            }
            if role.max == 0 || role.min > role.max {
                return Err(CoordinationError::InvalidRequest(format!(
                    "role {} of protocol {} has invalid bounds {}..={}",
                    role.name, self.name, role.min, role.max
                )));
            }
        }
        Ok(())
    }

    /// Check a participant set against the declared roles.
    ///
    /// A valid set has at least two participants, no user twice, only
    /// declared roles, and a participant count per role within its bounds.
    pub fn validate_participants(&self, participants: &[Participant]) -> Result<()> {
        if participants.len() < 2 {
            return Err(CoordinationError::InvalidParticipants(format!(
                "protocol {} needs at least two participants, got {}",
                self.name,
                participants.len()
            )));
        }

        let mut users = HashSet::new();
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for participant in participants {
            if !users.insert(&participant.user_id) {
                return Err(CoordinationError::InvalidParticipants(format!(
                    "user {} appears more than once",
                    participant.user_id
                )));
            }
            if self.role(&participant.role).is_none() {
                return Err(CoordinationError::InvalidParticipants(format!(
                    "role {} is not declared by protocol {}",
                    participant.role, self.name
                )));
            }
            *counts.entry(participant.role.as_str()).or_default() += 1;
        }

        for role in &self.roles {
            let count = counts.get(role.name.as_str()).copied().unwrap_or(0);
            if count < role.min || count > role.max {
                return Err(CoordinationError::InvalidParticipants(format!(
                    "role {} needs {}..={} participants, got {}",
                    role.name, role.min, role.max, count
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    fn participant(user: &str, role: &str) -> Participant {
        Participant::new(UserId::parse(user).unwrap(), role)
    }

    fn transfer() -> ProtocolSpec {
        ProtocolSpec::new("transfer")
            .with_role("sender")
            .with_role("receiver")
    }

    #[test]
    fn test_complete_assignment_accepted() {
        let spec = transfer();
        assert!(spec.validate().is_ok());
        let participants = vec![participant("a", "sender"), participant("b", "receiver")];
        assert!(spec.validate_participants(&participants).is_ok());
    }

    #[test]
    fn test_missing_role_rejected() {
        let participants = vec![participant("a", "sender"), participant("b", "sender")];
        assert!(matches!(
            transfer().validate_participants(&participants),
            Err(CoordinationError::InvalidParticipants(_))
        ));
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let participants = vec![participant("a", "sender"), participant("a", "receiver")];
        assert!(matches!(
            transfer().validate_participants(&participants),
            Err(CoordinationError::InvalidParticipants(_))
        ));
    }

    #[test]
    fn test_undeclared_role_rejected() {
        let participants = vec![
            participant("a", "sender"),
            participant("b", "receiver"),
            participant("c", "auditor"),
        ];
        assert!(transfer().validate_participants(&participants).is_err());
    }

    #[test]
    fn test_single_participant_rejected() {
        let spec = ProtocolSpec::new("solo").with_role_range("worker", 1, 4);
        assert!(spec
            .validate_participants(&[participant("a", "worker")])
            .is_err());
        assert!(spec
            .validate_participants(&[participant("a", "worker"), participant("b", "worker")])
            .is_ok());
    }

    #[test]
    fn test_invalid_declarations() {
        assert!(ProtocolSpec::new("empty").validate().is_err());
        assert!(ProtocolSpec::new("a:b").with_role("x").validate().is_err());
        assert!(ProtocolSpec::new("twice")
            .with_role("x")
            .with_role("x")
            .validate()
            .is_err());
        assert!(ProtocolSpec::new("bounds")
            .with_role_range("x", 3, 2)
            .validate()
            .is_err());
    }
}
