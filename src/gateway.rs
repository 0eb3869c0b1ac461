//! Collaborators outside the booking core: payments, notifications and
//! credential hashing. Process defaults live here too.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
  entity::{car, reservation, user},
  pricing::Money,
  prelude::*,
};

#[derive(Debug, Clone)]
pub struct ChargeRequest {
  pub amount: Money,
  pub currency: String,
  pub method: Option<String>,
  pub details: Option<json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
  Approved { transaction_id: String, details: json::Value },
  Declined { code: String, message: String },
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
  pub transaction_id: String,
  pub amount: Money,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
  Refunded { refund_id: String },
  Declined { code: String, message: String },
}

/// Remote payment capability. Transport errors come back as `Err`,
/// business refusals as `Declined`. No retries are attempted here.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
  async fn charge(&self, req: ChargeRequest) -> anyhow::Result<ChargeOutcome>;

  async fn refund(&self, req: RefundRequest) -> anyhow::Result<RefundOutcome>;
}

/// Approves everything. Used until a real provider is wired in.
pub struct SandboxProcessor;

#[async_trait]
impl PaymentProcessor for SandboxProcessor {
  async fn charge(&self, req: ChargeRequest) -> anyhow::Result<ChargeOutcome> {
    let transaction_id = format!("sbx_{}", Uuid::new_v4().simple());
    info!(
      "Sandbox charge {} {} approved as {transaction_id}",
      req.amount, req.currency
    );

    Ok(ChargeOutcome::Approved {
      details: json::json!({
        "provider": "sandbox",
        "amount": req.amount.to_string(),
        "currency": req.currency,
        "method": req.method,
      }),
      transaction_id,
    })
  }

  async fn refund(&self, req: RefundRequest) -> anyhow::Result<RefundOutcome> {
    let refund_id = format!("sbr_{}", Uuid::new_v4().simple());
    info!(
      "Sandbox refund {} of {} ({}) as {refund_id}",
      req.amount, req.transaction_id, req.reason
    );
    Ok(RefundOutcome::Refunded { refund_id })
  }
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn reservation_confirmed(
    &self,
    user: &user::Model,
    reservation: &reservation::Model,
    car: &car::Model,
  ) -> anyhow::Result<()>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
  async fn reservation_confirmed(
    &self,
    user: &user::Model,
    reservation: &reservation::Model,
    car: &car::Model,
  ) -> anyhow::Result<()> {
    info!(
      "Reservation #{} confirmed for {} <{}>: {} {} from {} to {}",
      reservation.id,
      user.full_name(),
      user.email,
      car.brand,
      car.model,
      reservation.start_date,
      reservation.end_date,
    );
    Ok(())
  }
}

pub trait CredentialHasher: Send + Sync {
  fn hash(&self, password: &str) -> anyhow::Result<String>;

  fn verify(&self, password: &str, hash: &str) -> anyhow::Result<bool>;
}

pub struct BcryptHasher {
  cost: u32,
}

impl Default for BcryptHasher {
  fn default() -> Self {
    Self { cost: bcrypt::DEFAULT_COST }
  }
}

impl CredentialHasher for BcryptHasher {
  fn hash(&self, password: &str) -> anyhow::Result<String> {
    bcrypt::hash(password, self.cost).context("Failed to hash password")
  }

  fn verify(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
  }
}
