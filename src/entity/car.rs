use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pricing::Money;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cars")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub brand: String,
  pub model: String,
  pub year: i32,
  pub color: String,
  #[sea_orm(unique)]
  pub license_plate: String,
  pub mileage: i32,
  pub category_id: Option<i32>,
  pub daily_price_cents: i64,
  pub deposit_cents: i64,
  pub included_km: i32,
  pub extra_km_price_cents: i64,
  pub seats: i32,
  pub transmission: String,
  pub fuel_type: String,
  pub features: Option<Json>,
  pub is_available: bool,
  /// Bumped by every booking transaction on this car.
  #[serde(skip)]
  pub lock_version: i32,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

impl Model {
  pub fn daily_price(&self) -> Money {
    Money::from_cents(self.daily_price_cents)
  }

  pub fn deposit(&self) -> Money {
    Money::from_cents(self.deposit_cents)
  }

  pub fn extra_km_price(&self) -> Money {
    Money::from_cents(self.extra_km_price_cents)
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::car_category::Entity",
    from = "Column::CategoryId",
    to = "super::car_category::Column::Id"
  )]
  Category,
  #[sea_orm(has_many = "super::car_availability::Entity")]
  Availabilities,
  #[sea_orm(has_many = "super::reservation::Entity")]
  Reservations,
}

impl Related<super::car_category::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Category.def()
  }
}

impl Related<super::car_availability::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Availabilities.def()
  }
}

impl Related<super::reservation::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Reservations.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
