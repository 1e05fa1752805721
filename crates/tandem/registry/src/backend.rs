//! Storage seam of the registry

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_types::{CredentialScope, Endpoint, Result, UserId};

/// What the registry remembers about one identity. Credentials are not
/// stored; they are re-verified from their signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub user_id: UserId,
    pub endpoint: Endpoint,
    pub registered_at: DateTime<Utc>,
    pub scope: CredentialScope,
}

/// Backing store for identity records
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Scope of the credentials issued for records in this backend
    fn credential_scope(&self) -> CredentialScope;

    /// Insert a new record. `DuplicateIdentity` if the id is taken.
    async fn insert(&self, record: IdentityRecord) -> Result<()>;

    async fn get(&self, user_id: &UserId) -> Result<Option<IdentityRecord>>;

    async fn list(&self) -> Result<Vec<IdentityRecord>>;
}
