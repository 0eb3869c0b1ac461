use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pricing::Money;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscription_types")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  pub duration_days: i32,
  /// Highest car category tier this plan may book (1..=6).
  pub level: Option<i32>,
  /// json feature flags, may carry a `level` of its own
  pub features: Option<Json>,
  pub created_at: DateTime,
}

impl Model {
  pub fn price(&self) -> Money {
    Money::from_cents(self.price_cents)
  }

  /// Explicit level, then `features.level`, then the plan id.
  pub fn access_level(&self) -> i32 {
    self
      .level
      .or_else(|| {
        self
          .features
          .as_ref()
          .and_then(|features| features.get("level"))
          .and_then(|level| level.as_i64())
          .map(|level| level as i32)
      })
      .unwrap_or(self.id)
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::subscription::Entity")]
  Subscriptions,
}

impl Related<super::subscription::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Subscriptions.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn plan(id: i32, level: Option<i32>, features: Option<Json>) -> Model {
    Model {
      id,
      name: format!("plan-{id}"),
      description: None,
      price_cents: 0,
      duration_days: 30,
      level,
      features,
      created_at: Utc::now().naive_utc(),
    }
  }

  #[test]
  fn access_level_fallbacks() {
    assert_eq!(plan(4, Some(2), None).access_level(), 2);
    assert_eq!(plan(4, None, Some(json::json!({ "level": 5 }))).access_level(), 5);
    assert_eq!(plan(4, None, Some(json::json!({ "seats": 5 }))).access_level(), 4);
    assert_eq!(plan(3, None, None).access_level(), 3);
  }
}
