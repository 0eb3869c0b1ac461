use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
  #[sea_orm(string_value = "active")]
  #[default]
  Active,
  #[sea_orm(string_value = "expired")]
  Expired,
  #[sea_orm(string_value = "cancelled")]
  Cancelled,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i32,
  pub subscription_type_id: i32,
  pub start_date: DateTime,
  pub expiry_date: DateTime,
  pub status: SubscriptionStatus,
  pub auto_renew: bool,
  pub payment_id: Option<i32>,
  pub cancelled_at: Option<DateTime>,
  pub cancel_reason: Option<String>,
  pub created_at: DateTime,
}

impl Model {
  pub fn is_active(&self, now: DateTime) -> bool {
    self.status == SubscriptionStatus::Active && self.expiry_date > now
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
    belongs_to = "super::subscription_type::Entity",
    from = "Column::SubscriptionTypeId",
    to = "super::subscription_type::Column::Id"
  )]
  SubscriptionType,
}

impl Related<super::user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl Related<super::subscription_type::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::SubscriptionType.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
