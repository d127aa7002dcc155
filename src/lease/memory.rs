//! Process-local lease store.
//!
//! Clones share the same records, so several electors in one process (or one
//! test) can contend for a lease exactly as separate processes would against
//! a remote store. The store can be switched into an outage to exercise the
//! transient-failure paths.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;

use super::{LeaseRecord, LeaseStore, LeaseVersion, VersionedLease};
use crate::error::StoreError;

#[derive(Debug)]
struct StoredLease {
    record: LeaseRecord,
    version: u64,
}

#[derive(Debug, Default)]
struct Shared {
    leases: Mutex<HashMap<String, StoredLease>>,
    next_version: AtomicU64,
    unavailable: AtomicBool,
    operations: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLeaseStore {
    shared: Arc<Shared>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While `true`, every call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of calls received, including failed ones.
    pub fn operations(&self) -> u64 {
        self.shared.operations.load(Ordering::SeqCst)
    }

    /// Current record without counting as an operation.
    pub async fn snapshot(&self, name: &str) -> Option<LeaseRecord> {
        self.shared
            .leases
            .lock()
            .await
            .get(name)
            .map(|stored| stored.record.clone())
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.shared.operations.fetch_add(1, Ordering::SeqCst);
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory lease store is offline"));
        }
        Ok(())
    }

    fn issue_version(&self) -> u64 {
        self.shared.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn get(&self, name: &str) -> Result<Option<VersionedLease>, StoreError> {
        self.begin()?;
        let leases = self.shared.leases.lock().await;
        Ok(leases.get(name).map(|stored| VersionedLease {
            record: stored.record.clone(),
            version: LeaseVersion::new(stored.version.to_string()),
        }))
    }

    async fn create(&self, name: &str, record: &LeaseRecord) -> Result<LeaseVersion, StoreError> {
        self.begin()?;
        record.validate()?;

        let mut leases = self.shared.leases.lock().await;
        if leases.contains_key(name) {
            return Err(StoreError::conflict(name));
        }

        let version = self.issue_version();
        leases.insert(
            name.to_string(),
            StoredLease {
                record: record.clone(),
                version,
            },
        );
        Ok(LeaseVersion::new(version.to_string()))
    }

    async fn update(
        &self,
        name: &str,
        record: &LeaseRecord,
        expected: &LeaseVersion,
    ) -> Result<LeaseVersion, StoreError> {
        self.begin()?;
        record.validate()?;

        let mut leases = self.shared.leases.lock().await;
        let stored = match leases.get_mut(name) {
            Some(stored) if stored.version.to_string() == expected.as_str() => stored,
            _ => return Err(StoreError::conflict(name)),
        };

        let version = self.issue_version();
        stored.record = record.clone();
        stored.version = version;
        Ok(LeaseVersion::new(version.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(holder: &str) -> LeaseRecord {
        LeaseRecord::acquired(holder, 15, Utc::now(), 0)
    }

    #[tokio::test]
    async fn get_missing_lease_returns_none() {
        let store = InMemoryLeaseStore::new();

        assert_eq!(store.get("my-lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = InMemoryLeaseStore::new();
        store.create("my-lock", &record("node-a")).await.unwrap();

        let err = store.create("my-lock", &record("node-b")).await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(
            store.snapshot("my-lock").await.unwrap().holder_identity,
            "node-a"
        );
    }

    #[tokio::test]
    async fn update_requires_current_version() {
        let store = InMemoryLeaseStore::new();
        let first = store.create("my-lock", &record("node-a")).await.unwrap();
        let second = store
            .update("my-lock", &record("node-a"), &first)
            .await
            .unwrap();

        assert_ne!(first, second);

        let err = store
            .update("my-lock", &record("node-b"), &first)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_of_missing_lease_conflicts() {
        let store = InMemoryLeaseStore::new();

        let err = store
            .update("my-lock", &record("node-a"), &LeaseVersion::new("1"))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn concurrent_updates_on_one_version_admit_one_writer() {
        let store = InMemoryLeaseStore::new();
        let version = store.create("my-lock", &record("node-a")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let version = version.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update("my-lock", &record(&format!("node-{}", i)), &version)
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn outage_fails_every_call_and_counts_it() {
        let store = InMemoryLeaseStore::new();
        store.set_unavailable(true);

        let err = store.get("my-lock").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.operations(), 1);

        store.set_unavailable(false);
        assert!(store.get("my-lock").await.is_ok());
        assert_eq!(store.operations(), 2);
    }

    #[tokio::test]
    async fn rejects_records_breaking_invariants() {
        let store = InMemoryLeaseStore::new();
        let mut bad = record("node-a");
        bad.renew_time = bad.acquire_time - chrono::Duration::seconds(1);

        let err = store.create("my-lock", &bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }
}
