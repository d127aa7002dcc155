use async_trait::async_trait;
use rusoto_core::Region;
use std::{
    env,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lease_election::{
    DynamoDbLeaseStore, ElectionConfig, ElectionError, InMemoryLeaseStore, LeaderCallbacks,
    LeaderElector, LeaseStore,
};

const DEFAULT_TABLE: &str = "leader_leases";

/// Logs while leading so a few copies of this binary show who holds the lease.
struct DemoCallbacks {
    identity: String,
    working: AtomicBool,
}

#[async_trait]
impl LeaderCallbacks for DemoCallbacks {
    async fn on_started_leading(&self, stop: CancellationToken) {
        info!(identity = %self.identity, "leading, starting work");
        self.working.store(true, Ordering::SeqCst);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        while self.working.load(Ordering::SeqCst) {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => info!(identity = %self.identity, "working..."),
            }
        }
        info!(identity = %self.identity, "work stopped");
    }

    async fn on_stopped_leading(&self) {
        self.working.store(false, Ordering::SeqCst);
        info!(identity = %self.identity, "no longer leading");
    }

    async fn on_new_leader(&self, identity: &str) {
        if identity == self.identity {
            return;
        }
        info!(leader = %identity, "new leader elected");
    }
}

#[tokio::main]
async fn main() -> Result<(), ElectionError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ElectionConfig::from_env()?;
    let store = build_store();
    let callbacks = Arc::new(DemoCallbacks {
        identity: config.identity.clone(),
        working: AtomicBool::new(false),
    });

    let elector = LeaderElector::new(config, store, callbacks)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
        }
        info!("shutting down");
        trigger.cancel();
    });

    elector.run(cancel).await;
    Ok(())
}

/// `ELECTION_STORE=memory` runs against a process-local store; anything else
/// uses DynamoDB in the default region.
fn build_store() -> Arc<dyn LeaseStore> {
    match env::var("ELECTION_STORE").as_deref() {
        Ok("memory") => {
            info!("using in-memory lease store");
            Arc::new(InMemoryLeaseStore::new())
        }
        _ => {
            let table = env::var("ELECTION_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string());
            info!(table = %table, "using DynamoDB lease store");
            Arc::new(DynamoDbLeaseStore::from_region(Region::default(), table))
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
