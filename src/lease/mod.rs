use async_trait::async_trait;
use std::fmt;

use crate::error::StoreError;

mod dynamo;
mod memory;
mod record;

pub use dynamo::DynamoDbLeaseStore;
pub use memory::InMemoryLeaseStore;
pub use record::LeaseRecord;

/// Opaque compare-and-swap token issued by a [`LeaseStore`] with every read and write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseVersion(String);

impl LeaseVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for LeaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedLease {
    pub record: LeaseRecord,
    pub version: LeaseVersion,
}

/// Storage for named lease records with optimistic concurrency.
///
/// Implementations must serialize conflicting writes: among concurrent
/// `create` calls for one name, or `update` calls presenting the same
/// version, at most one succeeds and the rest fail with
/// [`StoreError::Conflict`].
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<VersionedLease>, StoreError>;

    /// Creates the record if absent; `Conflict` if it already exists.
    async fn create(&self, name: &str, record: &LeaseRecord) -> Result<LeaseVersion, StoreError>;

    /// Replaces the record if its stored version still equals `expected`.
    ///
    /// A missing record is reported as `Conflict` too: whatever was observed
    /// is no longer there.
    async fn update(
        &self,
        name: &str,
        record: &LeaseRecord,
        expected: &LeaseVersion,
    ) -> Result<LeaseVersion, StoreError>;
}
