use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sleeps for `delay` unless `cancel` fires first.
///
/// Returns `false` if the wait was cut short by cancellation.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    sleep_until_or_cancel(Instant::now() + delay, cancel).await
}

pub(crate) async fn sleep_until_or_cancel(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => true,
    }
}

/// `base` stretched by a random amount up to `factor * base`.
///
/// A non-positive or non-finite factor, or a stretch that does not fit in a
/// `Duration`, leaves `base` unchanged.
pub(crate) fn jittered(base: Duration, factor: f64) -> Duration {
    if !factor.is_finite() || factor <= 0.0 {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0.0..factor);
    Duration::try_from_secs_f64(base.as_secs_f64() * extra)
        .ok()
        .and_then(|extra| base.checked_add(extra))
        .unwrap_or(base)
}
