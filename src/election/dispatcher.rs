use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::interface::LeaderCallbacks;

/// Fires [`LeaderCallbacks`] once per transition.
///
/// Owned by the control task; every method takes `&mut self`, so callbacks
/// from one dispatcher never overlap.
pub(crate) struct CallbackDispatcher {
    callbacks: Arc<dyn LeaderCallbacks>,
    leading: bool,
    reported_leader: Option<String>,
}

impl CallbackDispatcher {
    pub(crate) fn new(callbacks: Arc<dyn LeaderCallbacks>) -> Self {
        Self {
            callbacks,
            leading: false,
            reported_leader: None,
        }
    }

    /// Spawns the leadership work. `None` if this epoch was already started.
    pub(crate) fn started_leading(&mut self, stop: CancellationToken) -> Option<JoinHandle<()>> {
        if self.leading {
            return None;
        }
        self.leading = true;

        let callbacks = Arc::clone(&self.callbacks);
        Some(tokio::spawn(async move {
            callbacks.on_started_leading(stop).await;
        }))
    }

    /// Closes the current epoch. Does nothing if no epoch is open.
    pub(crate) async fn stopped_leading(&mut self) {
        if !self.leading {
            return;
        }
        self.leading = false;
        self.callbacks.on_stopped_leading().await;
    }

    /// Reports `holder` if it is a non-empty identity different from the last report.
    pub(crate) async fn observe_leader(&mut self, holder: &str) {
        if holder.is_empty() || self.reported_leader.as_deref() == Some(holder) {
            return;
        }
        debug!(leader = %holder, "observed new leader");
        self.reported_leader = Some(holder.to_string());
        self.callbacks.on_new_leader(holder).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LeaderCallbacks for Recorder {
        async fn on_started_leading(&self, stop: CancellationToken) {
            self.events.lock().await.push("started".to_string());
            stop.cancelled().await;
        }

        async fn on_stopped_leading(&self) {
            self.events.lock().await.push("stopped".to_string());
        }

        async fn on_new_leader(&self, identity: &str) {
            self.events.lock().await.push(format!("leader:{}", identity));
        }
    }

    #[tokio::test]
    async fn reports_each_new_leader_once() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = CallbackDispatcher::new(recorder.clone());

        dispatcher.observe_leader("node-a").await;
        dispatcher.observe_leader("node-a").await;
        dispatcher.observe_leader("").await;
        dispatcher.observe_leader("node-b").await;
        dispatcher.observe_leader("node-a").await;

        assert_eq!(
            *recorder.events.lock().await,
            vec!["leader:node-a", "leader:node-b", "leader:node-a"]
        );
    }

    #[tokio::test]
    async fn start_and_stop_fire_once_per_epoch() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = CallbackDispatcher::new(recorder.clone());
        let stop = CancellationToken::new();

        let work = dispatcher.started_leading(stop.clone()).unwrap();
        assert!(dispatcher.started_leading(stop.clone()).is_none());

        stop.cancel();
        work.await.unwrap();
        dispatcher.stopped_leading().await;
        dispatcher.stopped_leading().await;

        assert_eq!(*recorder.events.lock().await, vec!["started", "stopped"]);
    }

    #[tokio::test]
    async fn stop_without_start_is_silent() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = CallbackDispatcher::new(recorder.clone());

        dispatcher.stopped_leading().await;

        assert!(recorder.events.lock().await.is_empty());
    }
}
