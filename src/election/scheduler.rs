use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{timeout, timeout_at, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    dispatcher::CallbackDispatcher,
    engine::{ElectionEngine, Outcome},
};
use crate::{
    config::ElectionConfig,
    util::runnable::{jittered, sleep_or_cancel, sleep_until_or_cancel},
};

/// Where a participant stands in the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotLeading,
    Leading,
    Stopping,
}

/// Why a leadership epoch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No successful renewal within the renew deadline.
    StaleRenewal,
    Cancelled,
}

/// Read-only view of a participant's leadership, safe to hand to leader work.
#[derive(Debug, Clone)]
pub struct LeadershipStatus {
    leading: Arc<AtomicBool>,
    leader: watch::Receiver<Option<String>>,
    state: watch::Receiver<SchedulerState>,
}

impl LeadershipStatus {
    /// Whether this participant currently believes it leads.
    ///
    /// Turns `false` before `on_stopped_leading` is invoked.
    pub fn is_leader(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }

    /// Holder named by the last lease record this participant observed.
    pub fn leader(&self) -> Option<String> {
        self.leader.borrow().clone()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }
}

pub(crate) struct StatusPublisher {
    leading: Arc<AtomicBool>,
    leader: watch::Sender<Option<String>>,
    state: watch::Sender<SchedulerState>,
}

impl StatusPublisher {
    pub(crate) fn new() -> Self {
        let (leader, _) = watch::channel(None);
        let (state, _) = watch::channel(SchedulerState::NotLeading);
        Self {
            leading: Arc::new(AtomicBool::new(false)),
            leader,
            state,
        }
    }

    pub(crate) fn subscribe(&self) -> LeadershipStatus {
        LeadershipStatus {
            leading: Arc::clone(&self.leading),
            leader: self.leader.subscribe(),
            state: self.state.subscribe(),
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.leading
            .store(state == SchedulerState::Leading, Ordering::SeqCst);
        self.state.send_replace(state);
    }
}

/// Drives the engine at the configured cadence and owns the leadership state machine.
pub(crate) struct RenewalScheduler {
    config: ElectionConfig,
    engine: ElectionEngine,
    dispatcher: CallbackDispatcher,
    status: StatusPublisher,
}

impl RenewalScheduler {
    pub(crate) fn new(
        config: ElectionConfig,
        engine: ElectionEngine,
        dispatcher: CallbackDispatcher,
        status: StatusPublisher,
    ) -> Self {
        Self {
            config,
            engine,
            dispatcher,
            status,
        }
    }

    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        info!(
            identity = %self.config.identity,
            lease = %self.config.lease_name,
            lease_duration = ?self.config.lease_duration,
            renew_deadline = ?self.config.renew_deadline,
            retry_period = ?self.config.retry_period,
            "starting leader election"
        );

        while self.acquire(&cancel).await {
            if self.lead(&cancel).await == StopReason::Cancelled {
                break;
            }
        }

        self.status.set_state(SchedulerState::Stopping);
        info!(identity = %self.config.identity, "leader election stopped");
    }

    // false if cancelled before acquiring
    async fn acquire(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                outcome = self.engine.try_acquire_or_renew() => outcome,
            };
            self.report_leader().await;

            match outcome {
                Outcome::Acquired | Outcome::Renewed => {
                    info!(identity = %self.config.identity, ?outcome, "acquired lease");
                    return true;
                }
                Outcome::Denied => {}
                Outcome::Error(err) => {
                    warn!(identity = %self.config.identity, error = %err, "failed to acquire lease");
                }
            }

            let delay = jittered(self.config.retry_period, self.config.retry_jitter);
            if !sleep_or_cancel(delay, cancel).await {
                return false;
            }
        }
    }

    async fn lead(&mut self, cancel: &CancellationToken) -> StopReason {
        self.status.set_state(SchedulerState::Leading);
        info!(identity = %self.config.identity, "started leading");

        let stop = cancel.child_token();
        let work = self.dispatcher.started_leading(stop.clone());

        let reason = self.renew_until_lost(cancel).await;

        self.status.set_state(SchedulerState::NotLeading);
        stop.cancel();
        if let Some(work) = work {
            self.await_work(work).await;
        }
        self.dispatcher.stopped_leading().await;
        info!(identity = %self.config.identity, ?reason, "stopped leading");

        if reason == StopReason::Cancelled && self.config.release_on_cancel {
            self.release().await;
        }
        reason
    }

    async fn renew_until_lost(&mut self, cancel: &CancellationToken) -> StopReason {
        let mut deadline = Instant::now() + self.config.renew_deadline;

        loop {
            let next_attempt = Instant::now() + self.config.retry_period;
            if !sleep_until_or_cancel(next_attempt.min(deadline), cancel).await {
                return StopReason::Cancelled;
            }
            if Instant::now() >= deadline {
                warn!(
                    identity = %self.config.identity,
                    renew_deadline = ?self.config.renew_deadline,
                    "failed to renew lease within the renew deadline"
                );
                return StopReason::StaleRenewal;
            }

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Cancelled,
                attempt = timeout_at(deadline, self.engine.try_acquire_or_renew()) => attempt,
            };
            self.report_leader().await;

            match attempt {
                Ok(outcome) if outcome.is_success() => {
                    deadline = Instant::now() + self.config.renew_deadline;
                    debug!(identity = %self.config.identity, "renewed lease");
                }
                Ok(Outcome::Error(err)) => {
                    warn!(identity = %self.config.identity, error = %err, "failed to renew lease");
                }
                Ok(_) => {
                    debug!(identity = %self.config.identity, "lease renewal denied");
                }
                Err(_) => {
                    warn!(identity = %self.config.identity, "lease renewal timed out");
                }
            }
        }
    }

    async fn await_work(&self, mut work: JoinHandle<()>) {
        match timeout(self.config.shutdown_grace, &mut work).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(identity = %self.config.identity, error = %err, "leader work ended abnormally");
            }
            Err(_) => {
                warn!(
                    identity = %self.config.identity,
                    grace = ?self.config.shutdown_grace,
                    "leader work still running after the grace period"
                );
            }
        }
    }

    async fn release(&mut self) {
        match timeout(self.config.shutdown_grace, self.engine.release()).await {
            Ok(Ok(true)) => self.report_leader().await,
            Ok(Ok(false)) => {
                debug!(identity = %self.config.identity, "lease not held, nothing to release");
            }
            Ok(Err(err)) => {
                warn!(identity = %self.config.identity, error = %err, "failed to release lease");
            }
            Err(_) => {
                warn!(identity = %self.config.identity, "timed out releasing lease");
            }
        }
    }

    async fn report_leader(&mut self) {
        let holder = self.engine.observed_holder().map(str::to_owned);
        self.status.leader.send_replace(holder.clone());
        if let Some(holder) = holder {
            self.dispatcher.observe_leader(&holder).await;
        }
    }
}
