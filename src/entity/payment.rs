use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pricing::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
  #[sea_orm(string_value = "deposit")]
  Deposit,
  #[sea_orm(string_value = "extra_fees")]
  ExtraFees,
  #[sea_orm(string_value = "subscription")]
  Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  #[sea_orm(string_value = "pending")]
  Pending,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "failed")]
  Failed,
  /// Handed to the processor for a refund that has not been settled yet.
  #[sea_orm(string_value = "refunding")]
  Refunding,
  #[sea_orm(string_value = "refunded")]
  Refunded,
}

/// Exactly one of `reservation_id` / `subscription_id` is set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub reservation_id: Option<i32>,
  pub subscription_id: Option<i32>,
  pub amount_cents: i64,
  pub payment_type: PaymentType,
  pub payment_method: Option<String>,
  pub status: PaymentStatus,
  pub transaction_id: Option<String>,
  /// opaque processor payload
  pub payment_details: Option<Json>,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

impl Model {
  pub fn amount(&self) -> Money {
    Money::from_cents(self.amount_cents)
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::reservation::Entity",
    from = "Column::ReservationId",
    to = "super::reservation::Column::Id"
  )]
  Reservation,
  #[sea_orm(
    belongs_to = "super::subscription::Entity",
    from = "Column::SubscriptionId",
    to = "super::subscription::Column::Id"
  )]
  Subscription,
}

impl Related<super::reservation::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Reservation.def()
  }
}

impl Related<super::subscription::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Subscription.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
