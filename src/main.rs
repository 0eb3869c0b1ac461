//! Rental Server - car reservations, fleet and subscription plans
//!
//! Architecture:
//! - SeaORM for database access (SQLite)
//! - Axum for HTTP API with rate limiting
//! - Plugins supervised on Tokio (HTTP server, expiry sweeper)

mod actor;
mod cache;
mod entity;
mod error;
mod gateway;
mod plugins;
mod prelude;
mod pricing;
mod state;
mod sv;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
  plugins::{App, server, sweeper::Sweeper},
  prelude::*,
  state::{AppState, Config},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rental=debug,tower_http=debug,sea_orm=warn".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  info!("Starting Rental Server v{}", env!("CARGO_PKG_VERSION"));

  let app = AppState::new(config).await?;
  App::new().register(server::Plugin).register(Sweeper).run(Arc::new(app)).await
}
