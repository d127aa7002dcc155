use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    config::ElectionConfig,
    error::StoreError,
    lease::{LeaseRecord, LeaseStore, LeaseVersion, VersionedLease},
    util::Clock,
};

/// Result of one acquire-or-renew attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// This identity now holds the lease: it created it or took it over.
    Acquired,
    /// This identity already held the lease and extended it.
    Renewed,
    /// Someone else holds a valid lease, or a concurrent write won.
    Denied,
    /// The store could not be read or written; nothing is known to have changed.
    Error(StoreError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Acquired | Outcome::Renewed)
    }
}

/// The last record this process read or wrote, with the local time it did so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedLease {
    pub record: LeaseRecord,
    pub version: LeaseVersion,
    pub observed_at: DateTime<Utc>,
}

/// Reads the lease and decides whether to acquire, renew, take over or wait.
///
/// Every write is conditional on the version observed by the read in the
/// same attempt, so a lost race shows up as [`Outcome::Denied`] and the next
/// attempt starts over from a fresh read.
pub struct ElectionEngine {
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    lease_name: String,
    identity: String,
    lease_duration_seconds: u32,
    observed: Option<ObservedLease>,
}

impl ElectionEngine {
    pub fn new(store: Arc<dyn LeaseStore>, clock: Arc<dyn Clock>, config: &ElectionConfig) -> Self {
        Self {
            store,
            clock,
            lease_name: config.lease_name.clone(),
            identity: config.identity.clone(),
            lease_duration_seconds: config.lease_duration_seconds(),
            observed: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn observed(&self) -> Option<&ObservedLease> {
        self.observed.as_ref()
    }

    /// Holder named by the last observed record, if it names anyone.
    pub fn observed_holder(&self) -> Option<&str> {
        self.observed
            .as_ref()
            .map(|observed| observed.record.holder_identity.as_str())
            .filter(|holder| !holder.is_empty())
    }

    pub async fn try_acquire_or_renew(&mut self) -> Outcome {
        match self.attempt().await {
            Ok(outcome) => outcome,
            Err(StoreError::Conflict { .. }) => {
                debug!(
                    identity = %self.identity,
                    lease = %self.lease_name,
                    "lease changed concurrently, retrying next tick"
                );
                Outcome::Denied
            }
            Err(err) => Outcome::Error(err),
        }
    }

    async fn attempt(&mut self) -> Result<Outcome, StoreError> {
        let current = match self.store.get(&self.lease_name).await? {
            Some(current) => current,
            None => match self.create().await? {
                Some(current) => current,
                None => return Ok(Outcome::Acquired),
            },
        };

        let now = self.clock.now();
        let VersionedLease { record, version } = current;
        self.observe(record.clone(), version.clone(), now);

        if record.is_held_by(&self.identity) {
            let renewed = record.renewed_at(now, self.lease_duration_seconds);
            let version = self
                .store
                .update(&self.lease_name, &renewed, &version)
                .await?;
            self.observe(renewed, version, now);
            return Ok(Outcome::Renewed);
        }

        if !record.is_expired_at(now) {
            debug!(
                identity = %self.identity,
                lease = %self.lease_name,
                holder = %record.holder_identity,
                "lease is held by another candidate"
            );
            return Ok(Outcome::Denied);
        }

        let taken = record.taken_over_by(self.identity.as_str(), self.lease_duration_seconds, now);
        let version = self
            .store
            .update(&self.lease_name, &taken, &version)
            .await?;
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            previous_holder = %record.holder_identity,
            leader_transitions = taken.leader_transitions,
            "took over lease"
        );
        self.observe(taken, version, now);
        Ok(Outcome::Acquired)
    }

    // Some(winner) if another candidate created it first.
    async fn create(&mut self) -> Result<Option<VersionedLease>, StoreError> {
        let now = self.clock.now();
        let record = LeaseRecord::acquired(self.identity.as_str(), self.lease_duration_seconds, now, 0);

        match self.store.create(&self.lease_name, &record).await {
            Ok(version) => {
                info!(identity = %self.identity, lease = %self.lease_name, "created lease");
                self.observe(record, version, now);
                Ok(None)
            }
            Err(StoreError::Conflict { .. }) => {
                debug!(
                    identity = %self.identity,
                    lease = %self.lease_name,
                    "lease was created concurrently, re-reading"
                );
                match self.store.get(&self.lease_name).await? {
                    Some(current) => Ok(Some(current)),
                    None => Err(StoreError::conflict(self.lease_name.as_str())),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Clears the holder if the last observed record names this identity.
    ///
    /// Returns whether a release was written. Nothing is written when this
    /// process does not believe it holds the lease.
    pub async fn release(&mut self) -> Result<bool, StoreError> {
        let observed = match &self.observed {
            Some(observed) if observed.record.is_held_by(&self.identity) => observed,
            _ => return Ok(false),
        };

        let now = self.clock.now();
        let released = observed.record.released_at(now);
        let version = self
            .store
            .update(&self.lease_name, &released, &observed.version)
            .await?;
        info!(identity = %self.identity, lease = %self.lease_name, "released lease");
        self.observe(released, version, now);
        Ok(true)
    }

    fn observe(&mut self, record: LeaseRecord, version: LeaseVersion, observed_at: DateTime<Utc>) {
        self.observed = Some(ObservedLease {
            record,
            version,
            observed_at,
        });
    }
}
