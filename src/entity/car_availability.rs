//! Blackout windows: admin-declared ranges during which a car cannot be booked.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "car_availabilities")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub car_id: i32,
  pub start_date: DateTime,
  pub end_date: DateTime,
  pub reason: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::car::Entity",
    from = "Column::CarId",
    to = "super::car::Column::Id"
  )]
  Car,
}

impl Related<super::car::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Car.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
