//! JSON-file registry backend
//!
//! The whole record set is rewritten on every registration: written to a
//! sibling temp file, then renamed over the original. A failed write leaves
//! both the file and the in-memory view unchanged.

use crate::backend::{IdentityRecord, RegistryBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tandem_types::{CoordinationError, CredentialScope, Result, UserId};
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    identities: Vec<IdentityRecord>,
}

/// Durable identities with long-lived credentials
pub struct FileBackend {
    path: PathBuf,
    records: Mutex<BTreeMap<UserId, IdentityRecord>>,
}

impl FileBackend {
    /// Open (or create on first write) the registry file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: RegistryFile = serde_json::from_slice(&bytes).map_err(|e| {
                    CoordinationError::Backend(format!("parse {}: {e}", path.display()))
                })?;
                file.identities
                    .into_iter()
                    .map(|r| (r.user_id.clone(), r))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CoordinationError::Backend(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        tracing::debug!(path = %path.display(), count = records.len(), "Loaded registry file");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<UserId, IdentityRecord>) -> Result<()> {
        let file = RegistryFile {
            identities: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| CoordinationError::Backend(format!("encode registry: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| backend_io("create", parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| backend_io("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| backend_io("rename", &self.path, e))
    }
}

fn backend_io(action: &str, path: &Path, e: std::io::Error) -> CoordinationError {
    CoordinationError::Backend(format!("{action} {}: {e}", path.display()))
}

#[async_trait]
impl RegistryBackend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn credential_scope(&self) -> CredentialScope {
        CredentialScope::Durable
    }

    async fn insert(&self, record: IdentityRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.user_id) {
            return Err(CoordinationError::DuplicateIdentity(
                record.user_id.to_string(),
            ));
        }

        let mut next = records.clone();
        next.insert(record.user_id.clone(), record);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<IdentityRecord>> {
        Ok(self.records.lock().await.get(user_id).cloned())
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}
