use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "car_categories")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub name: String,
  pub description: Option<String>,
  /// Ordinal compared against the subscription level when gating is enabled.
  pub tier: i32,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::car::Entity")]
  Cars,
}

impl Related<super::car::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Cars.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
