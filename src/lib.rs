//! Lease-based leader election.
//!
//! Participants contend for one named [`LeaseRecord`] kept in a shared
//! [`LeaseStore`]. The holder renews it every retry period; a leader that
//! cannot renew within its renew deadline steps down, and once the lease
//! expires another participant takes it over with a compare-and-swap write.
//!
//! This is a best-effort single-writer lease, not a consensus protocol. A
//! demoted leader may still be finishing side effects when the next one
//! starts; callers needing strict exclusion should fence their writes with
//! the record's `leader_transitions` counter.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod election;
pub mod error;
pub mod interface;
pub mod lease;
pub mod util;

pub use config::ElectionConfig;
pub use election::{LeadershipStatus, Outcome, SchedulerState};
pub use error::{ElectionError, StoreError};
pub use interface::LeaderCallbacks;
pub use lease::{
    DynamoDbLeaseStore, InMemoryLeaseStore, LeaseRecord, LeaseStore, LeaseVersion, VersionedLease,
};
pub use util::{Clock, SystemClock, TokioClock};

use election::{CallbackDispatcher, ElectionEngine, RenewalScheduler, StatusPublisher};

/// One participant in a leader election.
pub struct LeaderElector {
    config: ElectionConfig,
    store: Arc<dyn LeaseStore>,
    callbacks: Arc<dyn LeaderCallbacks>,
    clock: Arc<dyn Clock>,
    status: StatusPublisher,
}

impl LeaderElector {
    /// Validates `config`; nothing touches the store until [`run`](Self::run).
    pub fn new(
        config: ElectionConfig,
        store: Arc<dyn LeaseStore>,
        callbacks: Arc<dyn LeaderCallbacks>,
    ) -> Result<Self, ElectionError> {
        config.validate()?;

        Ok(Self {
            config,
            store,
            callbacks,
            clock: Arc::new(SystemClock),
            status: StatusPublisher::new(),
        })
    }

    /// Replaces the wall clock used for lease timestamps and expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// A handle that keeps reporting after the elector is moved into [`run`](Self::run).
    pub fn status(&self) -> LeadershipStatus {
        self.status.subscribe()
    }

    /// Contends for leadership until `cancel` fires.
    ///
    /// On cancellation while leading, the leader work's stop token is
    /// cancelled, `on_stopped_leading` runs, and the lease is released if
    /// configured, before this returns.
    pub async fn run(self, cancel: CancellationToken) {
        let engine = ElectionEngine::new(self.store, self.clock, &self.config);
        let dispatcher = CallbackDispatcher::new(self.callbacks);

        RenewalScheduler::new(self.config, engine, dispatcher, self.status)
            .run(cancel)
            .await;
    }
}
