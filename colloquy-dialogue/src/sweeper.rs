//! Periodic removal of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use colloquy_core::session::SessionStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Spawn a sweeper driven by the store's own [`SessionConfig`]: every
/// `sweep_interval_secs`, removing sessions idle past `timeout_minutes`.
///
/// [`SessionConfig`]: colloquy_core::config::SessionConfig
#[must_use]
pub fn spawn_session_sweeper_from_config(store: Arc<SessionStore>) -> JoinHandle<()> {
    let config = store.config();
    let interval = config.sweep_interval().max(Duration::from_millis(1));
    let timeout = config.timeout();
    spawn_session_sweeper(store, interval, timeout)
}

/// Spawn a task that sweeps `store` every `interval`, removing sessions idle
/// longer than `timeout`. Abort the returned handle to stop it.
#[must_use]
pub fn spawn_session_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    timeout: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick.
        ticker.tick().await;

        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "Session sweeper started");
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired(timeout);
            debug!(removed, remaining = store.len(), "Session sweep");
        }
    })
}
