//! In-memory registry backend
//!
//! Records live as long as the process. Suitable for demos and tests.

use crate::backend::{IdentityRecord, RegistryBackend};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tandem_types::{CoordinationError, CredentialScope, Result, UserId};

/// Process-lifetime identities with session-scoped credentials
pub struct EphemeralBackend {
    records: DashMap<UserId, IdentityRecord>,
}

impl EphemeralBackend {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl Default for EphemeralBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryBackend for EphemeralBackend {
    fn kind(&self) -> &'static str {
        "ephemeral"
    }

    fn credential_scope(&self) -> CredentialScope {
        CredentialScope::Session
    }

    async fn insert(&self, record: IdentityRecord) -> Result<()> {
        match self.records.entry(record.user_id.clone()) {
            Entry::Occupied(_) => Err(CoordinationError::DuplicateIdentity(
                record.user_id.to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<IdentityRecord>> {
        Ok(self.records.get(user_id).map(|r| r.clone()))
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tandem_types::Endpoint;

    fn record(id: &str) -> IdentityRecord {
        IdentityRecord {
            user_id: UserId::parse(id).unwrap(),
            endpoint: Endpoint::new("inproc://test"),
            registered_at: Utc::now(),
            scope: CredentialScope::Session,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let backend = EphemeralBackend::new();
        backend.insert(record("alice")).await.unwrap();

        let found = backend
            .get(&UserId::parse("alice").unwrap())
            .await
            .unwrap();
        assert!(found.is_some());
        assert!(backend
            .get(&UserId::parse("bob").unwrap())
            .await
            .unwrap()
            .is_none());
        assert_eq!(backend.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let backend = EphemeralBackend::new();
        backend.insert(record("alice")).await.unwrap();
        assert!(matches!(
            backend.insert(record("alice")).await,
            Err(CoordinationError::DuplicateIdentity(_))
        ));
    }
}
