pub mod server;
pub mod sweeper;

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinSet, time::sleep};
use tracing::{error, info, warn};

use crate::state::AppState;

const RESTART_DELAY: Duration = Duration::from_secs(5);

#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()>;
}

/// Supervises plugins: each runs in its own task and is restarted
/// after a crash until the process is asked to stop.
pub struct App {
  plugins: Vec<Arc<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self { plugins: Vec::new() }
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Arc::new(plugin));
    self
  }

  async fn supervise(plugin: Arc<dyn Plugin>, app: Arc<AppState>) {
    let name = plugin.name();
    info!("SYSTEM: Service `{name}` initialized");

    loop {
      let task = tokio::spawn({
        let (plugin, app) = (plugin.clone(), app.clone());
        async move { plugin.start(app).await }
      });

      match task.await {
        Ok(Ok(())) => warn!("Service `{name}` stopped unexpectedly (Ok)."),
        Ok(Err(err)) => error!("Service `{name}` crashed with error: {err:#}."),
        Err(err) if err.is_cancelled() => {
          info!("Service `{name}` shutdown.");
          return;
        }
        Err(_) => error!("Service `{name}` PANICKED!"),
      }

      sleep(RESTART_DELAY).await;
      info!("SYSTEM: Restarting service `{name}`...");
    }
  }

  /// Runs until ctrl-c, then aborts every plugin.
  pub async fn run(self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut tasks = JoinSet::new();
    for plugin in self.plugins {
      tasks.spawn(Self::supervise(plugin, app.clone()));
    }

    tokio::signal::ctrl_c().await?;
    info!("SYSTEM: Shutdown requested, stopping {} service(s)", tasks.len());
    tasks.shutdown().await;
    Ok(())
  }
}
