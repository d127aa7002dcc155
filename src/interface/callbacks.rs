use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Hooks invoked by the elector as leadership changes.
///
/// All three are called from the elector's control task, one at a time.
/// `on_started_leading` is the exception in that it runs as its own task for
/// as long as the caller keeps working; it must return once `stop` is
/// cancelled. `on_stopped_leading` is awaited before the elector tries to
/// lead again or returns from `run`.
#[async_trait]
pub trait LeaderCallbacks: Send + Sync {
    /// Leadership acquired. Do leader-only work until `stop` is cancelled.
    async fn on_started_leading(&self, stop: CancellationToken);

    /// Leadership lost, either to the renew deadline or to cancellation.
    async fn on_stopped_leading(&self);

    /// The observed lease holder changed to `identity`, which may be this process.
    async fn on_new_leader(&self, identity: &str);
}
