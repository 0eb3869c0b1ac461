use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub reservation_id: i32,
  pub user_id: i32,
  pub car_id: i32,
  pub rating: i32,
  pub comment: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::reservation::Entity",
    from = "Column::ReservationId",
    to = "super::reservation::Column::Id"
  )]
  Reservation,
}

impl Related<super::reservation::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Reservation.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
