use sea_orm::sea_query::Expr;
use serde::{Deserialize, Serialize};

use crate::{
  actor::Actor,
  cache::Cache,
  entity::{
    PaymentStatus, PaymentType, SubscriptionStatus, payment, subscription,
    subscription_type, user,
  },
  gateway::{ChargeOutcome, ChargeRequest, RefundOutcome, RefundRequest},
  pricing::Money,
  prelude::*,
  state::{Gateways, Policy},
  sv::fleet::MAX_TIER,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlan {
  pub name: String,
  pub description: Option<String>,
  pub price: Money,
  #[serde(default = "default_duration")]
  pub duration_days: i32,
  pub level: Option<i32>,
  pub features: Option<json::Value>,
}

fn default_duration() -> i32 {
  30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub price: Option<Money>,
  pub duration_days: Option<i32>,
  pub level: Option<i32>,
  pub features: Option<json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
  pub subscription_type_id: i32,
  #[serde(default)]
  pub auto_renew: bool,
  /// Cancel the current active subscription instead of failing.
  #[serde(default)]
  pub replace: bool,
  pub method: Option<String>,
  pub details: Option<json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscribed {
  pub subscription: subscription::Model,
  pub payment: Option<payment::Model>,
}

struct Charge {
  transaction_id: String,
  details: json::Value,
  method: Option<String>,
}

fn check_plan(price: Money, duration_days: i32, level: Option<i32>) -> Result<()> {
  if price < Money::ZERO {
    return Err(Error::validation("Price cannot be negative"));
  }
  if duration_days < 1 {
    return Err(Error::validation("Duration must be at least one day"));
  }
  if let Some(level) = level
    && !(1..=MAX_TIER).contains(&level)
  {
    return Err(Error::validation(format!("Level must be between 1 and {MAX_TIER}")));
  }
  Ok(())
}

/// Subscription of `user_id` that is active at `now`, with its plan.
pub async fn active<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
  now: DateTime,
) -> Result<Option<(subscription::Model, subscription_type::Model)>> {
  let found = subscription::Entity::find()
    .filter(subscription::Column::UserId.eq(user_id))
    .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
    .filter(subscription::Column::ExpiryDate.gt(now))
    .order_by_desc(subscription::Column::ExpiryDate)
    .find_also_related(subscription_type::Entity)
    .one(conn)
    .await?;

  Ok(
    found
      .filter(|(sub, _)| sub.is_active(now))
      .and_then(|(sub, plan)| plan.map(|plan| (sub, plan))),
  )
}

/// Highest car category tier the user may book, `None` without an active plan.
pub async fn max_category_tier<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
  now: DateTime,
) -> Result<Option<i32>> {
  Ok(active(conn, user_id, now).await?.map(|(_, plan)| plan.access_level()))
}

/// Row-locks the user for the rest of the transaction.
async fn lock_user<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<()> {
  let res = user::Entity::update_many()
    .col_expr(user::Column::Role, Expr::col(user::Column::Role).into())
    .filter(user::Column::Id.eq(user_id))
    .exec(conn)
    .await?;
  if res.rows_affected == 0 {
    return Err(Error::NotFound("User"));
  }
  Ok(())
}

pub struct Subscription<'a> {
  db: &'a DatabaseConnection,
  gateways: &'a Gateways,
  cache: &'a Cache,
  policy: &'a Policy,
}

impl<'a> Subscription<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    gateways: &'a Gateways,
    cache: &'a Cache,
    policy: &'a Policy,
  ) -> Self {
    Self { db, gateways, cache, policy }
  }

  pub async fn plans(&self) -> Result<Vec<subscription_type::Model>> {
    if let Some(plans) = self.cache.subscription_types.get(&()) {
      return Ok(plans);
    }

    let plans = subscription_type::Entity::find()
      .order_by_asc(subscription_type::Column::PriceCents)
      .all(self.db)
      .await?;
    self.cache.subscription_types.insert((), plans.clone());
    Ok(plans)
  }

  pub async fn plan(&self, id: i32) -> Result<subscription_type::Model> {
    subscription_type::Entity::find_by_id(id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("Subscription type"))
  }

  async fn ensure_name_free(&self, name: &str, except: Option<i32>) -> Result<()> {
    let mut query =
      subscription_type::Entity::find().filter(subscription_type::Column::Name.eq(name));
    if let Some(id) = except {
      query = query.filter(subscription_type::Column::Id.ne(id));
    }
    if query.one(self.db).await?.is_some() {
      return Err(Error::conflict(format!("Subscription type `{name}` already exists")));
    }
    Ok(())
  }

  pub async fn create_plan(
    &self,
    actor: &Actor,
    new: NewPlan,
  ) -> Result<subscription_type::Model> {
    actor.ensure_admin()?;
    if new.name.trim().is_empty() {
      return Err(Error::validation("Name is required"));
    }
    check_plan(new.price, new.duration_days, new.level)?;
    self.ensure_name_free(new.name.trim(), None).await?;

    let plan = subscription_type::ActiveModel {
      name: Set(new.name.trim().to_string()),
      description: Set(new.description),
      price_cents: Set(new.price.cents()),
      duration_days: Set(new.duration_days),
      level: Set(new.level),
      features: Set(new.features),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    self.cache.subscription_types.invalidate(&());
    info!("Subscription type `{}` created", plan.name);
    Ok(plan)
  }

  pub async fn update_plan(
    &self,
    actor: &Actor,
    id: i32,
    patch: PlanPatch,
  ) -> Result<subscription_type::Model> {
    actor.ensure_admin()?;
    let plan = self.plan(id).await?;
    check_plan(
      patch.price.unwrap_or(plan.price()),
      patch.duration_days.unwrap_or(plan.duration_days),
      patch.level.or(plan.level),
    )?;

    let mut active: subscription_type::ActiveModel = plan.into();
    if let Some(name) = patch.name {
      if name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
      }
      self.ensure_name_free(name.trim(), Some(id)).await?;
      active.name = Set(name.trim().to_string());
    }
    if let Some(description) = patch.description {
      active.description = Set(Some(description));
    }
    if let Some(price) = patch.price {
      active.price_cents = Set(price.cents());
    }
    if let Some(days) = patch.duration_days {
      active.duration_days = Set(days);
    }
    if let Some(level) = patch.level {
      active.level = Set(Some(level));
    }
    if let Some(features) = patch.features {
      active.features = Set(Some(features));
    }

    let plan = active.update(self.db).await?;
    self.cache.subscription_types.invalidate(&());
    Ok(plan)
  }

  pub async fn delete_plan(&self, actor: &Actor, id: i32) -> Result<()> {
    actor.ensure_admin()?;
    let plan = self.plan(id).await?;

    let used = subscription::Entity::find()
      .filter(subscription::Column::SubscriptionTypeId.eq(id))
      .count(self.db)
      .await?;
    if used > 0 {
      return Err(Error::conflict(format!(
        "Subscription type `{}` has {used} subscription(s)",
        plan.name
      )));
    }

    subscription_type::Entity::delete_by_id(id).exec(self.db).await?;
    self.cache.subscription_types.invalidate(&());
    Ok(())
  }

  pub async fn active_for_user(
    &self,
    user_id: i32,
  ) -> Result<Option<(subscription::Model, subscription_type::Model)>> {
    active(self.db, user_id, now()).await
  }

  pub async fn has_active_subscription(&self, user_id: i32) -> Result<bool> {
    Ok(self.active_for_user(user_id).await?.is_some())
  }

  pub async fn history(&self, actor: &Actor, user_id: i32) -> Result<Vec<subscription::Model>> {
    actor.ensure_access(user_id)?;
    Ok(
      subscription::Entity::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .order_by_desc(subscription::Column::StartDate)
        .all(self.db)
        .await?,
    )
  }

  pub async fn subscribe(&self, actor: &Actor, req: SubscribeRequest) -> Result<Subscribed> {
    let plan = self.plan(req.subscription_type_id).await?;

    if !req.replace && self.has_active_subscription(actor.user_id).await? {
      return Err(Error::conflict("User already has an active subscription"));
    }

    let charge = if plan.price().is_positive() {
      Some(self.charge(&plan, req.method, req.details).await?)
    } else {
      None
    };

    match self.persist(actor, &plan, req.auto_renew, req.replace, charge.as_ref()).await {
      Ok(subscribed) => {
        info!(
          "User #{} subscribed to `{}` until {}",
          actor.user_id, plan.name, subscribed.subscription.expiry_date
        );
        Ok(subscribed)
      }
      Err(err) => {
        if let Some(charge) = charge {
          self.void(&plan, charge).await;
        }
        Err(err)
      }
    }
  }

  async fn charge(
    &self,
    plan: &subscription_type::Model,
    method: Option<String>,
    details: Option<json::Value>,
  ) -> Result<Charge> {
    let outcome = self
      .gateways
      .processor
      .charge(ChargeRequest {
        amount: plan.price(),
        currency: self.policy.currency.clone(),
        method: method.clone(),
        details,
      })
      .await;

    match outcome {
      Ok(ChargeOutcome::Approved { transaction_id, details }) => {
        Ok(Charge { transaction_id, details, method })
      }
      Ok(ChargeOutcome::Declined { message, .. }) => {
        Err(Error::upstream(format!("Subscription payment declined: {message}")))
      }
      Err(err) => {
        error!("Subscription charge for `{}` failed: {err:#}", plan.name);
        Err(Error::upstream("Payment processor unavailable"))
      }
    }
  }

  /// Gives the money back when the charge cannot be recorded.
  async fn void(&self, plan: &subscription_type::Model, charge: Charge) {
    let outcome = self
      .gateways
      .processor
      .refund(RefundRequest {
        transaction_id: charge.transaction_id.clone(),
        amount: plan.price(),
        reason: String::from("subscription not recorded"),
      })
      .await;

    match outcome {
      Ok(RefundOutcome::Refunded { refund_id }) => {
        warn!("Charge {} voided as {refund_id}", charge.transaction_id);
      }
      Ok(RefundOutcome::Declined { message, .. }) => {
        error!("Charge {} could not be voided: {message}", charge.transaction_id);
      }
      Err(err) => {
        error!("Charge {} could not be voided: {err:#}", charge.transaction_id);
      }
    }
  }

  async fn persist(
    &self,
    actor: &Actor,
    plan: &subscription_type::Model,
    auto_renew: bool,
    replace: bool,
    charge: Option<&Charge>,
  ) -> Result<Subscribed> {
    let now = now();
    let txn = self.db.begin().await?;
    lock_user(&txn, actor.user_id).await?;

    if let Some((current, _)) = active(&txn, actor.user_id, now).await? {
      if !replace {
        return Err(Error::conflict("User already has an active subscription"));
      }
      subscription::ActiveModel {
        status: Set(SubscriptionStatus::Cancelled),
        cancelled_at: Set(Some(now)),
        cancel_reason: Set(Some(format!("replaced by `{}`", plan.name))),
        ..current.into()
      }
      .update(&txn)
      .await?;
    }

    let sub = subscription::ActiveModel {
      user_id: Set(actor.user_id),
      subscription_type_id: Set(plan.id),
      start_date: Set(now),
      expiry_date: Set(now + TimeDelta::days(plan.duration_days as i64)),
      status: Set(SubscriptionStatus::Active),
      auto_renew: Set(auto_renew),
      payment_id: Set(None),
      created_at: Set(now),
      ..Default::default()
    }
    .insert(&txn)
    .await?;

    let (subscription, payment) = match charge {
      Some(charge) => {
        let payment = payment::ActiveModel {
          reservation_id: Set(None),
          subscription_id: Set(Some(sub.id)),
          amount_cents: Set(plan.price_cents),
          payment_type: Set(PaymentType::Subscription),
          payment_method: Set(charge.method.clone()),
          status: Set(PaymentStatus::Completed),
          transaction_id: Set(Some(charge.transaction_id.clone())),
          payment_details: Set(Some(charge.details.clone())),
          created_at: Set(now),
          updated_at: Set(now),
          ..Default::default()
        }
        .insert(&txn)
        .await?;

        let sub = subscription::ActiveModel { payment_id: Set(Some(payment.id)), ..sub.into() }
          .update(&txn)
          .await?;
        (sub, Some(payment))
      }
      None => (sub, None),
    };

    txn.commit().await?;
    Ok(Subscribed { subscription, payment })
  }

  /// Repeated cancellation is a no-op.
  pub async fn cancel(
    &self,
    actor: &Actor,
    id: i32,
    reason: Option<String>,
  ) -> Result<subscription::Model> {
    let sub = subscription::Entity::find_by_id(id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("Subscription"))?;
    actor.ensure_access(sub.user_id)?;

    match sub.status {
      SubscriptionStatus::Cancelled => Ok(sub),
      SubscriptionStatus::Expired => {
        Err(Error::invalid_state("Subscription has already expired"))
      }
      SubscriptionStatus::Active => {
        let sub = subscription::ActiveModel {
          status: Set(SubscriptionStatus::Cancelled),
          cancelled_at: Set(Some(now())),
          cancel_reason: Set(reason),
          auto_renew: Set(false),
          ..sub.into()
        }
        .update(self.db)
        .await?;
        info!("Subscription #{id} cancelled");
        Ok(sub)
      }
    }
  }

  /// Marks lapsed subscriptions as expired, returns how many changed.
  pub async fn sweep_expired(&self) -> Result<u64> {
    let res = subscription::Entity::update_many()
      .col_expr(
        subscription::Column::Status,
        Expr::value(SubscriptionStatus::Expired),
      )
      .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
      .filter(subscription::Column::ExpiryDate.lte(now()))
      .exec(self.db)
      .await?;
    Ok(res.rows_affected)
  }

  pub async fn count_active(&self) -> Result<u64> {
    Ok(
      subscription::Entity::find()
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .filter(subscription::Column::ExpiryDate.gt(now()))
        .count(self.db)
        .await?,
    )
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use tokio_test::assert_ok;

  use super::*;
  use crate::{
    entity::Role,
    testing::{self, MockNotifier, MockProcessor, day},
  };

  fn admin() -> Actor {
    Actor::new(9_999, Role::Admin)
  }

  fn plan(name: &str, cents: i64, level: Option<i32>) -> NewPlan {
    NewPlan {
      name: name.into(),
      description: None,
      price: Money::from_cents(cents),
      duration_days: 30,
      level,
      features: None,
    }
  }

  fn subscribe_to(id: i32) -> SubscribeRequest {
    SubscribeRequest {
      subscription_type_id: id,
      auto_renew: false,
      replace: false,
      method: Some("card".into()),
      details: None,
    }
  }

  #[tokio::test]
  async fn past_expiry_is_inactive() {
    let h = testing::harness().await;
    let user = testing::customer(h.db()).await;
    let plan = testing::plan(h.db(), Some(2)).await;
    let sub = testing::subscription(h.db(), user.id, plan.id, day(-3)).await;

    assert!(!sub.is_active(now()));
    let sv = h.app.sv().subscription;
    assert!(!sv.has_active_subscription(user.id).await.unwrap());
    assert_eq!(max_category_tier(h.db(), user.id, now()).await.unwrap(), None);
  }

  #[tokio::test]
  async fn subscribe_charges_and_links_payment() {
    let h = testing::harness().await;
    let user = testing::customer(h.db()).await;
    let owner = Actor::customer(user.id);
    let sv = h.app.sv().subscription;

    let gold = sv.create_plan(&admin(), plan("Gold", 4900, Some(4))).await.unwrap();
    let done = sv.subscribe(&owner, subscribe_to(gold.id)).await.unwrap();

    let payment = done.payment.unwrap();
    assert_eq!(payment.payment_type, PaymentType::Subscription);
    assert_eq!(payment.subscription_id, Some(done.subscription.id));
    assert_eq!(payment.reservation_id, None);
    assert_eq!(done.subscription.payment_id, Some(payment.id));
    assert!(done.subscription.is_active(now()));
    assert_eq!(max_category_tier(h.db(), user.id, now()).await.unwrap(), Some(4));
  }

  #[tokio::test]
  async fn one_active_subscription_per_user() {
    let h = testing::harness().await;
    let user = testing::customer(h.db()).await;
    let owner = Actor::customer(user.id);
    let sv = h.app.sv().subscription;

    let basic = sv.create_plan(&admin(), plan("Basic", 900, Some(1))).await.unwrap();
    let plus = sv.create_plan(&admin(), plan("Plus", 1900, Some(3))).await.unwrap();

    let first = sv.subscribe(&owner, subscribe_to(basic.id)).await.unwrap();
    assert!(matches!(
      sv.subscribe(&owner, subscribe_to(plus.id)).await,
      Err(Error::Conflict(_))
    ));
    assert_eq!(h.processor.charges(), 1);

    let replaced =
      sv.subscribe(&owner, SubscribeRequest { replace: true, ..subscribe_to(plus.id) }).await.unwrap();
    assert_eq!(replaced.subscription.subscription_type_id, plus.id);

    let history = sv.history(&owner, user.id).await.unwrap();
    let old = history.iter().find(|s| s.id == first.subscription.id).unwrap();
    assert_eq!(old.status, SubscriptionStatus::Cancelled);
    assert_eq!(sv.count_active().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn declined_charge_creates_nothing() {
    let db = testing::setup_db().await;
    let h = testing::build(
      db,
      Default::default(),
      MockProcessor::declining(),
      MockNotifier::default(),
    );
    let owner = Actor::customer(testing::customer(h.db()).await.id);
    let sv = h.app.sv().subscription;

    let gold = sv.create_plan(&admin(), plan("Gold", 4900, None)).await.unwrap();
    assert!(matches!(
      sv.subscribe(&owner, subscribe_to(gold.id)).await,
      Err(Error::Upstream(_))
    ));
    assert_eq!(subscription::Entity::find().count(h.db()).await.unwrap(), 0);
    assert_eq!(payment::Entity::find().count(h.db()).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn unrecorded_charge_is_voided() {
    let h = testing::harness().await;
    let sv = h.app.sv().subscription;
    let gold = sv.create_plan(&admin(), plan("Gold", 4900, None)).await.unwrap();

    // user row missing: the charge goes through, persisting fails
    let ghost = Actor::customer(4_242);
    assert!(matches!(
      sv.subscribe(&ghost, subscribe_to(gold.id)).await,
      Err(Error::NotFound("User"))
    ));
    assert_eq!(h.processor.charges(), 1);
    assert_eq!(h.processor.refunds(), 1);
  }

  #[tokio::test]
  async fn free_plans_skip_the_processor() {
    let h = testing::harness().await;
    let owner = Actor::customer(testing::customer(h.db()).await.id);
    let sv = h.app.sv().subscription;

    let trial = sv.create_plan(&admin(), plan("Trial", 0, Some(1))).await.unwrap();
    let done = sv.subscribe(&owner, subscribe_to(trial.id)).await.unwrap();
    assert!(done.payment.is_none());
    assert_eq!(h.processor.charges.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn cancel_is_idempotent() {
    let h = testing::harness().await;
    let user = testing::customer(h.db()).await;
    let owner = Actor::customer(user.id);
    let plan = testing::plan(h.db(), None).await;
    let sub = testing::subscription(h.db(), user.id, plan.id, day(10)).await;
    let sv = h.app.sv().subscription;

    let stranger = Actor::customer(testing::customer(h.db()).await.id);
    assert!(matches!(sv.cancel(&stranger, sub.id, None).await, Err(Error::Forbidden(_))));

    let cancelled = sv.cancel(&owner, sub.id, Some("too pricey".into())).await.unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    let again = sv.cancel(&owner, sub.id, Some("other".into())).await.unwrap();
    assert_eq!(again, cancelled);
    assert!(!sv.has_active_subscription(user.id).await.unwrap());
  }

  #[tokio::test]
  async fn sweep_marks_lapsed_rows() {
    let h = testing::harness().await;
    let a = testing::customer(h.db()).await;
    let b = testing::customer(h.db()).await;
    let plan = testing::plan(h.db(), None).await;
    testing::subscription(h.db(), a.id, plan.id, day(-2)).await;
    let live = testing::subscription(h.db(), b.id, plan.id, day(5)).await;
    let sv = h.app.sv().subscription;

    assert_eq!(sv.sweep_expired().await.unwrap(), 1);
    assert_eq!(sv.sweep_expired().await.unwrap(), 0);

    let (active, _) = sv.active_for_user(b.id).await.unwrap().unwrap();
    assert_eq!(active.id, live.id);
  }

  #[tokio::test]
  async fn plan_validation_and_names() {
    let h = testing::harness().await;
    let sv = h.app.sv().subscription;

    assert!(matches!(
      sv.create_plan(&Actor::new(1, Role::Manager), plan("Gold", 100, None)).await,
      Err(Error::Forbidden(_))
    ));
    assert!(matches!(
      sv.create_plan(&admin(), plan("Gold", 100, Some(7))).await,
      Err(Error::Validation(_))
    ));

    let gold = sv.create_plan(&admin(), plan("Gold", 100, Some(6))).await.unwrap();
    assert!(matches!(
      sv.create_plan(&admin(), plan("Gold", 200, None)).await,
      Err(Error::Conflict(_))
    ));
    assert_eq!(sv.plans().await.unwrap().len(), 1);

    let patch = PlanPatch { price: Some(Money::from_cents(250)), ..Default::default() };
    let gold = sv.update_plan(&admin(), gold.id, patch).await.unwrap();
    assert_eq!(gold.price(), Money::from_cents(250));
    assert_eq!(sv.plans().await.unwrap()[0].price_cents, 250);

    assert_ok!(sv.delete_plan(&admin(), gold.id).await);
    assert!(sv.plans().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn plans_in_use_cannot_be_deleted() {
    let h = testing::harness().await;
    let user = testing::customer(h.db()).await;
    let plan = testing::plan(h.db(), None).await;
    testing::subscription(h.db(), user.id, plan.id, day(5)).await;

    assert!(matches!(
      h.app.sv().subscription.delete_plan(&admin(), plan.id).await,
      Err(Error::Conflict(_))
    ));
  }

  #[tokio::test]
  async fn tier_falls_back_to_feature_level() {
    let h = testing::harness().await;
    let user = testing::customer(h.db()).await;
    let sv = h.app.sv().subscription;

    let new = NewPlan { features: Some(json::json!({ "level": 5 })), ..plan("Flex", 0, None) };
    let flex = sv.create_plan(&admin(), new).await.unwrap();
    testing::subscription(h.db(), user.id, flex.id, day(5)).await;

    assert_eq!(max_category_tier(h.db(), user.id, now()).await.unwrap(), Some(5));
  }
}
