use std::sync::Arc;

use async_trait::async_trait;

use crate::{plugins::Plugin, prelude::*, state::AppState};

/// Expires lapsed subscriptions and evicts stale cache entries.
pub struct Sweeper;

#[async_trait]
impl Plugin for Sweeper {
  fn name(&self) -> &'static str {
    "sweeper"
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut interval = time::interval(app.config.sweep_interval);

    loop {
      interval.tick().await;

      match app.sv().subscription.sweep_expired().await {
        Ok(0) => {}
        Ok(count) => info!("Marked {count} subscription(s) as expired"),
        Err(err) => error!("Subscription sweep failed: {err}"),
      }

      let evicted = app.cache.gc();
      if evicted > 0 {
        debug!("Evicted {evicted} stale cache entries");
      }
    }
  }
}
