//! Tandem Entry Store
//!
//! Entries are partitioned by task. Each partition knows its protocol and the
//! users allowed to touch it; each key inside it is a `watch` cell that holds
//! either nothing or the one value ever written to it.
//!
//! Readers that arrive before the writer subscribe to the cell and are woken
//! by the write. Deleting a partition drops its cells, which wakes every
//! suspended reader with `UnknownTask`.

#![deny(unsafe_code)]

use chrono::Utc;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tandem_types::{CoordinationError, Entry, EntryKey, Result, TaskId, UserId};
use tokio::sync::watch;

type Slot = watch::Sender<Option<Entry>>;

struct Partition {
    protocol: String,
    members: HashSet<UserId>,
    slots: DashMap<String, Slot>,
}

impl Partition {
    fn check_member(&self, scope: TaskId, user: &UserId) -> Result<()> {
        if self.members.contains(user) {
            Ok(())
        } else {
            Err(CoordinationError::Unauthorized(format!(
                "{user} is not a member of task {scope}"
            )))
        }
    }

    fn check_key(&self, scope: TaskId, key: &EntryKey) -> Result<()> {
        if key.task_id() != scope || key.protocol() != self.protocol {
            return Err(CoordinationError::InvalidEntryKey(format!(
                "{key} does not belong to {}:{scope}",
                self.protocol
            )));
        }
        Ok(())
    }
}

/// Write-once, task-scoped key/value store.
pub struct EntryStore {
    partitions: DashMap<TaskId, Arc<Partition>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    /// Create the partition of a task.
    pub fn open_scope(
        &self,
        scope: TaskId,
        protocol: impl Into<String>,
        members: impl IntoIterator<Item = UserId>,
    ) -> Result<()> {
        match self.partitions.entry(scope) {
            MapEntry::Occupied(_) => Err(CoordinationError::InvalidRequest(format!(
                "scope {scope} is already open"
            ))),
            MapEntry::Vacant(slot) => {
                slot.insert(Arc::new(Partition {
                    protocol: protocol.into(),
                    members: members.into_iter().collect(),
                    slots: DashMap::new(),
                }));
                tracing::debug!(task_id = %scope, "Opened entry scope");
                Ok(())
            }
        }
    }

    fn partition(&self, scope: TaskId) -> Result<Arc<Partition>> {
        self.partitions
            .get(&scope)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| CoordinationError::Unauthorized(format!("no open scope {scope}")))
    }

    /// Write `value` under `key`. Fails with `EntryExists` if a value is
    /// already present; the stored value is never replaced.
    pub fn write(&self, scope: TaskId, key: &EntryKey, value: Vec<u8>, writer: &UserId) -> Result<Entry> {
        let partition = self.partition(scope)?;
        partition.check_member(scope, writer)?;
        partition.check_key(scope, key)?;

        let entry = Entry {
            key: key.clone(),
            scope,
            value,
            written_by: writer.clone(),
            written_at: Utc::now(),
        };

        let written = partition
            .slots
            .entry(key.local_name().to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_if_modified(|current| {
                if current.is_some() {
                    false
                } else {
                    *current = Some(entry.clone());
                    true
                }
            });

        if !written {
            return Err(CoordinationError::EntryExists(key.to_string()));
        }

        tracing::debug!(task_id = %scope, key = %key, writer = %writer, "Entry written");
        Ok(entry)
    }

    /// Read `key`, suspending until it is written. `None` waits forever.
    pub async fn read(
        &self,
        scope: TaskId,
        key: &EntryKey,
        reader: &UserId,
        timeout: Option<Duration>,
    ) -> Result<Entry> {
        let mut rx = {
            let partition = self.partition(scope)?;
            partition.check_member(scope, reader)?;
            partition.check_key(scope, key)?;
            let rx = partition
                .slots
                .entry(key.local_name().to_string())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe();
            rx
        };

        let wait = rx.wait_for(Option::is_some);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(CoordinationError::Timeout(format!(
                        "{key} not written within {limit:?}"
                    )))
                }
            },
            None => wait.await,
        };

        match outcome {
            Ok(value) => value
                .clone()
                .ok_or_else(|| CoordinationError::UnknownTask(scope.to_string())),
            Err(_) => Err(CoordinationError::UnknownTask(format!(
                "scope {scope} was deleted"
            ))),
        }
    }

    /// Non-blocking read.
    pub fn try_read(&self, scope: TaskId, key: &EntryKey, reader: &UserId) -> Result<Option<Entry>> {
        let partition = self.partition(scope)?;
        partition.check_member(scope, reader)?;
        partition.check_key(scope, key)?;
        Ok(partition
            .slots
            .get(key.local_name())
            .and_then(|slot| slot.borrow().clone()))
    }

    /// Keys that hold a value, sorted.
    pub fn list_keys(&self, scope: TaskId, reader: &UserId) -> Result<Vec<EntryKey>> {
        let partition = self.partition(scope)?;
        partition.check_member(scope, reader)?;
        let mut keys: Vec<EntryKey> = partition
            .slots
            .iter()
            .filter_map(|slot| slot.value().borrow().as_ref().map(|e| e.key.clone()))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Drop a task's partition and every entry in it.
    pub fn delete_scope(&self, scope: TaskId) -> bool {
        let removed = self.partitions.remove(&scope).is_some();
        if removed {
            tracing::debug!(task_id = %scope, "Deleted entry scope");
        }
        removed
    }

    pub fn is_open(&self, scope: TaskId) -> bool {
        self.partitions.contains_key(&scope)
    }

    pub fn scope_count(&self) -> usize {
        self.partitions.len()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: Arc<EntryStore>,
        scope: TaskId,
        alice: UserId,
        bob: UserId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(EntryStore::new());
        let scope = TaskId::generate();
        let alice = UserId::parse("alice").unwrap();
        let bob = UserId::parse("bob").unwrap();
        store
            .open_scope(scope, "transfer", [alice.clone(), bob.clone()])
            .unwrap();
        Fixture {
            store,
            scope,
            alice,
            bob,
        }
    }

    fn key(f: &Fixture, name: &str) -> EntryKey {
        EntryKey::new("transfer", f.scope, name).unwrap()
    }

    #[test]
    fn test_write_once() {
        let f = fixture();
        let k = key(&f, "file");
        f.store.write(f.scope, &k, b"first".to_vec(), &f.alice).unwrap();

        let second = f.store.write(f.scope, &k, b"second".to_vec(), &f.bob);
        assert!(matches!(second, Err(CoordinationError::EntryExists(_))));

        let stored = f.store.try_read(f.scope, &k, &f.bob).unwrap().unwrap();
        assert_eq!(stored.value, b"first");
        assert_eq!(stored.written_by, f.alice);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_before_write_rendezvous() {
        let f = fixture();
        let k = key(&f, "file");

        let reader = {
            let store = Arc::clone(&f.store);
            let (scope, k, bob) = (f.scope, k.clone(), f.bob.clone());
            tokio::spawn(async move {
                store
                    .read(scope, &k, &bob, Some(Duration::from_secs(5)))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        f.store.write(f.scope, &k, b"hello".to_vec(), &f.alice).unwrap();

        let entry = reader.await.unwrap().unwrap();
        assert_eq!(entry.value, b"hello");
    }

    #[tokio::test]
    async fn test_read_timeout_has_no_side_effect() {
        let f = fixture();
        let k = key(&f, "never");
        let result = f
            .store
            .read(f.scope, &k, &f.bob, Some(Duration::from_millis(20)))
            .await;
        assert!(matches!(result, Err(CoordinationError::Timeout(_))));
        assert!(f.store.list_keys(f.scope, &f.bob).unwrap().is_empty());

        f.store.write(f.scope, &k, b"late".to_vec(), &f.alice).unwrap();
        let entry = f
            .store
            .read(f.scope, &k, &f.bob, Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(entry.value, b"late");
    }

    #[tokio::test]
    async fn test_non_member_rejected() {
        let f = fixture();
        let k = key(&f, "file");
        let mallory = UserId::parse("mallory").unwrap();

        assert!(matches!(
            f.store.write(f.scope, &k, b"x".to_vec(), &mallory),
            Err(CoordinationError::Unauthorized(_))
        ));
        assert!(matches!(
            f.store.read(f.scope, &k, &mallory, None).await,
            Err(CoordinationError::Unauthorized(_))
        ));
        assert!(f.store.list_keys(f.scope, &mallory).is_err());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let f = fixture();
        let other_task = EntryKey::new("transfer", TaskId::generate(), "file").unwrap();
        let other_protocol = EntryKey::new("auction", f.scope, "file").unwrap();
        for k in [other_task, other_protocol] {
            assert!(matches!(
                f.store.write(f.scope, &k, b"x".to_vec(), &f.alice),
                Err(CoordinationError::InvalidEntryKey(_))
            ));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delete_scope_wakes_readers() {
        let f = fixture();
        let k = key(&f, "file");

        let reader = {
            let store = Arc::clone(&f.store);
            let (scope, k, bob) = (f.scope, k.clone(), f.bob.clone());
            tokio::spawn(async move { store.read(scope, &k, &bob, None).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.store.delete_scope(f.scope));
        assert!(!f.store.is_open(f.scope));

        let result = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(CoordinationError::UnknownTask(_))));
    }

    #[test]
    fn test_list_keys_sorted() {
        let f = fixture();
        for name in ["b", "a", "c"] {
            f.store
                .write(f.scope, &key(&f, name), name.as_bytes().to_vec(), &f.alice)
                .unwrap();
        }
        let names: Vec<String> = f
            .store
            .list_keys(f.scope, &f.bob)
            .unwrap()
            .iter()
            .map(|k| k.local_name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_scope_opened_once() {
        let f = fixture();
        assert!(f.store.open_scope(f.scope, "transfer", []).is_err());
        assert_eq!(f.store.scope_count(), 1);
    }
}
