//! Periodic session expiry check.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::api::HttpClient;

/// Check the session every `interval` until the task is aborted. The first
/// check happens one interval after start; the just-in-time check covers
/// requests made before that.
pub fn spawn_expiry_monitor(client: HttpClient, interval: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if client.session().bearer().is_none() {
        continue;
      }
      let active = client.check_session().await;
      debug!(active, "periodic session check");
    }
  })
}
