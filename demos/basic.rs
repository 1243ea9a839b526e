//! # Demo: basic
//!
//! Schedules two sources against a fake fetch callback (one healthy, one
//! flaky), pushes a network transition, and prints runtime events until
//! Ctrl-C.
//!
//! ## Run
//! ```bash
//! cargo run --example basic --features logging
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use refetch::{
    FetchError, FetchFn, IntervalSpec, LogWriter, NetworkQuality, NetworkState, RefreshConfig,
    RefreshManager, RefreshOptions, SourceDescriptor, Subscribe,
};

static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. A fetch callback standing in for the host's transport: "flaky"
    //    fails twice before recovering.
    let fetch = FetchFn::arc(|source_id: String, reason| async move {
        tracing::info!(source_id, reason = reason.as_label(), "fetching");
        tokio::time::sleep(Duration::from_millis(120)).await;
        if source_id == "flaky" && ATTEMPTS.fetch_add(1, Ordering::Relaxed) < 2 {
            return Err(FetchError::Remote {
                error: "HTTP 503".into(),
            });
        }
        Ok(())
    });

    // 2. Build the runtime with the built-in logging subscriber.
    let mut cfg = RefreshConfig::default();
    cfg.min_interval = Duration::from_secs(5);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let manager = RefreshManager::builder(cfg).with_subscribers(subs).build(fetch);

    // 3. Register sources.
    for (id, interval) in [("steady", "10 seconds"), ("flaky", "15 seconds")] {
        manager
            .schedule_source(SourceDescriptor {
                source_id: id.into(),
                source_type: "demo".into(),
                refresh: RefreshOptions::every(IntervalSpec::Text(interval.into())),
            })
            .await?;
    }

    // 4. Simulate a brief outage and recovery.
    manager.set_network_state(NetworkState::offline()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    manager
        .set_network_state(NetworkState {
            is_online: true,
            quality: NetworkQuality::Good,
            vpn_active: false,
        })
        .await;

    // 5. Run until Ctrl-C, then tear down with the bounded grace.
    manager.run_until_shutdown().await?;
    Ok(())
}
