use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pricing::Money;

/// Lifecycle status. Stored as `status_id`, a foreign key into the seeded
/// `reservation_statuses` table; the discriminants are those row ids.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
  #[sea_orm(num_value = 1)]
  #[default]
  Pending,
  #[sea_orm(num_value = 2)]
  Confirmed,
  #[sea_orm(num_value = 3)]
  Cancelled,
  #[sea_orm(num_value = 4)]
  InProgress,
  #[sea_orm(num_value = 5)]
  Completed,
  #[sea_orm(num_value = 6)]
  Refunded,
}

impl ReservationStatus {
  /// Statuses that make a car unbookable for other customers.
  pub const BLOCKING: [Self; 2] = [Self::Confirmed, Self::InProgress];

  pub fn name(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Confirmed => "confirmed",
      Self::Cancelled => "cancelled",
      Self::InProgress => "in_progress",
      Self::Completed => "completed",
      Self::Refunded => "refunded",
    }
  }

  pub fn is_blocking(self) -> bool {
    Self::BLOCKING.contains(&self)
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Cancelled | Self::Completed | Self::Refunded)
  }

  /// Edges of the lifecycle graph.
  pub fn can_transition_to(self, next: Self) -> bool {
    use ReservationStatus::*;

    matches!(
      (self, next),
      (Pending, Confirmed)
        | (Pending | Confirmed, Cancelled)
        | (Confirmed, InProgress)
        | (InProgress, Completed)
        | (Cancelled | Completed, Refunded)
    )
  }
}

impl std::fmt::Display for ReservationStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i32,
  pub car_id: i32,
  #[serde(rename = "status")]
  pub status_id: ReservationStatus,
  pub start_date: DateTime,
  pub end_date: DateTime,
  pub pickup_location: String,
  pub return_location: String,
  /// json array of priced add-ons
  pub add_ons: Option<Json>,
  pub total_price_cents: i64,
  pub deposit_cents: i64,
  pub deposit_paid: bool,
  pub initial_mileage: Option<i32>,
  pub final_mileage: Option<i32>,
  pub km_driven: Option<i32>,
  pub extra_km: Option<i32>,
  pub extra_fees_cents: Option<i64>,
  pub actual_start_date: Option<DateTime>,
  pub actual_end_date: Option<DateTime>,
  pub special_requests: Option<String>,
  pub cancelled_at: Option<DateTime>,
  pub cancel_reason: Option<String>,
  /// Optimistic concurrency token for lifecycle transitions.
  pub version: i32,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

impl Model {
  pub fn status(&self) -> ReservationStatus {
    self.status_id
  }

  pub fn total_price(&self) -> Money {
    Money::from_cents(self.total_price_cents)
  }

  pub fn deposit(&self) -> Money {
    Money::from_cents(self.deposit_cents)
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::user::Entity",
    from = "Column::UserId",
    to = "super::user::Column::Id"
  )]
  User,
  #[sea_orm(
    belongs_to = "super::car::Entity",
    from = "Column::CarId",
    to = "super::car::Column::Id"
  )]
  Car,
  #[sea_orm(has_many = "super::payment::Entity")]
  Payments,
  #[sea_orm(has_one = "super::review::Entity")]
  Review,
}

impl Related<super::user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl Related<super::car::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Car.def()
  }
}

impl Related<super::payment::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Payments.def()
  }
}

impl Related<super::review::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Review.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
