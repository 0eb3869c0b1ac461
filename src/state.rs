use std::{env, sync::Arc};

use crate::{
  cache::Cache,
  gateway::{
    BcryptHasher, CredentialHasher, LogNotifier, Notifier, PaymentProcessor,
    SandboxProcessor,
  },
  prelude::*,
  sv,
};

/// Booking rules that vary per deployment.
#[derive(Debug, Clone)]
pub struct Policy {
  pub currency: String,
  /// Subscriptions cap the category tier a customer may book.
  pub category_gating: bool,
  /// Pending reservations hold their dates against other bookers.
  pub pending_blocks: bool,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      currency: String::from("EUR"),
      category_gating: false,
      pending_blocks: false,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub port: u16,
  pub cache_ttl: Duration,
  pub sweep_interval: Duration,
  pub policy: Policy,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: String::from("sqlite:rental.db?mode=rwc"),
      port: 3000,
      cache_ttl: Duration::from_secs(5 * 60),
      sweep_interval: Duration::from_secs(10 * 60),
      policy: Policy::default(),
    }
  }
}

fn var(key: &str) -> Option<String> {
  env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(key: &str, default: bool) -> anyhow::Result<bool> {
  let Some(value) = var(key) else { return Ok(default) };
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    other => anyhow::bail!("{key}: expected a boolean, got `{other}`"),
  }
}

fn duration(key: &str, default: Duration) -> anyhow::Result<Duration> {
  match var(key) {
    Some(value) => humantime::parse_duration(value.trim())
      .with_context(|| format!("{key}: invalid duration `{value}`")),
    None => Ok(default),
  }
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let defaults = Self::default();

    let port = match var("PORT") {
      Some(port) => port.trim().parse().context("PORT: invalid port")?,
      None => defaults.port,
    };

    Ok(Self {
      database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
      port,
      cache_ttl: duration("CACHE_TTL", defaults.cache_ttl)?,
      sweep_interval: duration("SWEEP_INTERVAL", defaults.sweep_interval)?,
      policy: Policy {
        currency: var("CURRENCY").unwrap_or(defaults.policy.currency),
        category_gating: flag("CATEGORY_GATING", false)?,
        pending_blocks: flag("PENDING_BLOCKS", false)?,
      },
    })
  }
}

#[derive(Clone)]
pub struct Gateways {
  pub processor: Arc<dyn PaymentProcessor>,
  pub notifier: Arc<dyn Notifier>,
  pub hasher: Arc<dyn CredentialHasher>,
}

impl Default for Gateways {
  fn default() -> Self {
    Self {
      processor: Arc::new(SandboxProcessor),
      notifier: Arc::new(LogNotifier),
      hasher: Arc::new(BcryptHasher::default()),
    }
  }
}

pub struct Services<'a> {
  pub user: sv::User<'a>,
  pub fleet: sv::Fleet<'a>,
  pub reservation: sv::Reservation<'a>,
  pub subscription: sv::Subscription<'a>,
}

pub struct AppState {
  pub db: DatabaseConnection,
  pub gateways: Gateways,
  pub cache: Cache,
  pub config: Config,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
      .await
      .context("Failed to connect to database")?;

    info!("Running migrations...");
    migration::Migrator::up(&db, None).await.context("Failed to run migrations")?;

    Ok(Self::with_parts(db, Gateways::default(), config))
  }

  pub fn with_parts(db: DatabaseConnection, gateways: Gateways, config: Config) -> Self {
    Self { cache: Cache::new(config.cache_ttl), db, gateways, config }
  }

  pub fn sv(&self) -> Services<'_> {
    Services {
      user: sv::User::new(&self.db, self.gateways.hasher.as_ref()),
      fleet: sv::Fleet::new(&self.db, &self.cache, &self.config.policy),
      reservation: sv::Reservation::new(&self.db, &self.gateways, &self.config.policy),
      subscription: sv::Subscription::new(
        &self.db,
        &self.gateways,
        &self.cache,
        &self.config.policy,
      ),
    }
  }
}
