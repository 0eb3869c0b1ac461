//! Fixtures shared by the unit tests.

use std::sync::{
  Arc,
  atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::Days;

use crate::{
  entity::{
    ReservationStatus, Role, SubscriptionStatus, car, car_availability,
    car_category, reservation, subscription, subscription_type, user,
  },
  gateway::{
    ChargeOutcome, ChargeRequest, CredentialHasher, Notifier, PaymentProcessor,
    RefundOutcome, RefundRequest,
  },
  prelude::*,
  state::{AppState, Config, Gateways, Policy},
};

static SEQ: AtomicUsize = AtomicUsize::new(1);

fn seq() -> usize {
  SEQ.fetch_add(1, Ordering::Relaxed)
}

pub async fn setup_db() -> DatabaseConnection {
  let db = Database::connect("sqlite::memory:").await.unwrap();
  migration::Migrator::up(&db, None).await.unwrap();
  db
}

/// 10:00 on the `n`-th day after tomorrow.
pub fn day(n: i64) -> DateTime {
  let tomorrow = Utc::now().date_naive() + Days::new(1);
  let date = if n >= 0 {
    tomorrow + Days::new(n as u64)
  } else {
    tomorrow - Days::new(n.unsigned_abs())
  };
  date.and_hms_opt(10, 0, 0).unwrap()
}

pub async fn user(db: &DatabaseConnection, role: Role) -> user::Model {
  let n = seq();
  user::ActiveModel {
    email: Set(format!("user{n}@rental.test")),
    first_name: Set(String::from("Test")),
    last_name: Set(format!("User{n}")),
    password_hash: Set(String::from("plain:secret")),
    role: Set(role),
    created_at: Set(now()),
    ..Default::default()
  }
  .insert(db)
  .await
  .unwrap()
}

pub async fn customer(db: &DatabaseConnection) -> user::Model {
  user(db, Role::Customer).await
}

pub async fn category(db: &DatabaseConnection, tier: i32) -> car_category::Model {
  car_category::ActiveModel {
    name: Set(format!("tier-{tier}-{}", seq())),
    description: Set(None),
    tier: Set(tier),
    created_at: Set(now()),
    ..Default::default()
  }
  .insert(db)
  .await
  .unwrap()
}

/// Unsaved car with the given rates.
pub fn car_model(daily_cents: i64, included_km: i32, extra_km_cents: i64) -> car::Model {
  car::Model {
    id: 0,
    brand: String::from("Skoda"),
    model: String::from("Octavia"),
    year: 2024,
    color: String::from("grey"),
    license_plate: format!("TS-{}", seq()),
    mileage: 900,
    category_id: None,
    daily_price_cents: daily_cents,
    deposit_cents: 30000,
    included_km,
    extra_km_price_cents: extra_km_cents,
    seats: 5,
    transmission: String::from("manual"),
    fuel_type: String::from("petrol"),
    features: None,
    is_available: true,
    lock_version: 0,
    created_at: now(),
    updated_at: now(),
  }
}

/// 50.00/day, 100 km included, 0.50 per extra km.
pub async fn car(db: &DatabaseConnection, plate: &str) -> car::Model {
  car_in(db, plate, None).await
}

pub async fn car_in(
  db: &DatabaseConnection,
  plate: &str,
  category_id: Option<i32>,
) -> car::Model {
  let model = car::Model {
    license_plate: plate.to_string(),
    category_id,
    ..car_model(5000, 100, 50)
  };
  let mut active = car::ActiveModel::from(model).reset_all();
  active.id = sea_orm::ActiveValue::NotSet;
  active.insert(db).await.unwrap()
}

pub async fn blackout(
  db: &DatabaseConnection,
  car_id: i32,
  start: DateTime,
  end: DateTime,
) -> car_availability::Model {
  car_availability::ActiveModel {
    car_id: Set(car_id),
    start_date: Set(start),
    end_date: Set(end),
    reason: Set(Some(String::from("maintenance"))),
    created_at: Set(now()),
    ..Default::default()
  }
  .insert(db)
  .await
  .unwrap()
}

/// Inserts a reservation row directly, bypassing the lifecycle.
pub async fn reservation(
  db: &DatabaseConnection,
  user_id: i32,
  car_id: i32,
  start: DateTime,
  end: DateTime,
  status: ReservationStatus,
) -> reservation::Model {
  reservation::ActiveModel {
    user_id: Set(user_id),
    car_id: Set(car_id),
    status_id: Set(status),
    start_date: Set(start),
    end_date: Set(end),
    pickup_location: Set(String::from("Airport")),
    return_location: Set(String::from("Airport")),
    add_ons: Set(None),
    total_price_cents: Set(10000),
    deposit_cents: Set(30000),
    deposit_paid: Set(false),
    version: Set(0),
    created_at: Set(now()),
    updated_at: Set(now()),
    ..Default::default()
  }
  .insert(db)
  .await
  .unwrap()
}

pub async fn plan(db: &DatabaseConnection, level: Option<i32>) -> subscription_type::Model {
  subscription_type::ActiveModel {
    name: Set(format!("plan-{}", seq())),
    description: Set(None),
    price_cents: Set(1900),
    duration_days: Set(30),
    level: Set(level),
    features: Set(None),
    created_at: Set(now()),
    ..Default::default()
  }
  .insert(db)
  .await
  .unwrap()
}

/// Active row as stored; `expiry` may already be in the past.
pub async fn subscription(
  db: &DatabaseConnection,
  user_id: i32,
  plan_id: i32,
  expiry: DateTime,
) -> subscription::Model {
  subscription::ActiveModel {
    user_id: Set(user_id),
    subscription_type_id: Set(plan_id),
    start_date: Set(expiry - TimeDelta::days(30)),
    expiry_date: Set(expiry),
    status: Set(SubscriptionStatus::Active),
    auto_renew: Set(false),
    created_at: Set(now()),
    ..Default::default()
  }
  .insert(db)
  .await
  .unwrap()
}

#[derive(Default)]
pub struct MockProcessor {
  pub decline: AtomicBool,
  pub fail: AtomicBool,
  pub charges: AtomicUsize,
  pub refunds: AtomicUsize,
}

impl MockProcessor {
  pub fn declining() -> Self {
    let mock = Self::default();
    mock.decline.store(true, Ordering::SeqCst);
    mock
  }

  pub fn charges(&self) -> usize {
    self.charges.load(Ordering::SeqCst)
  }

  pub fn refunds(&self) -> usize {
    self.refunds.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
  async fn charge(&self, req: ChargeRequest) -> anyhow::Result<ChargeOutcome> {
    if self.fail.load(Ordering::SeqCst) {
      anyhow::bail!("connection reset");
    }
    let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
    if self.decline.load(Ordering::SeqCst) {
      return Ok(ChargeOutcome::Declined {
        code: String::from("card_declined"),
        message: String::from("Card declined"),
      });
    }
    Ok(ChargeOutcome::Approved {
      transaction_id: format!("tx-{n}"),
      details: json::json!({ "amount": req.amount.cents() }),
    })
  }

  async fn refund(&self, req: RefundRequest) -> anyhow::Result<RefundOutcome> {
    if self.fail.load(Ordering::SeqCst) {
      anyhow::bail!("connection reset");
    }
    self.refunds.fetch_add(1, Ordering::SeqCst);
    if self.decline.load(Ordering::SeqCst) {
      return Ok(RefundOutcome::Declined {
        code: String::from("refund_refused"),
        message: String::from("Refund refused"),
      });
    }
    Ok(RefundOutcome::Refunded { refund_id: format!("rf-{}", req.transaction_id) })
  }
}

#[derive(Default)]
pub struct MockNotifier {
  pub fail: bool,
  pub sent: AtomicUsize,
}

#[async_trait]
impl Notifier for MockNotifier {
  async fn reservation_confirmed(
    &self,
    _user: &user::Model,
    _reservation: &reservation::Model,
    _car: &car::Model,
  ) -> anyhow::Result<()> {
    self.sent.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      anyhow::bail!("smtp unavailable");
    }
    Ok(())
  }
}

pub struct PlainHasher;

impl CredentialHasher for PlainHasher {
  fn hash(&self, password: &str) -> anyhow::Result<String> {
    Ok(format!("plain:{password}"))
  }

  fn verify(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
    Ok(hash.strip_prefix("plain:") == Some(password))
  }
}

pub struct Harness {
  pub app: AppState,
  pub processor: Arc<MockProcessor>,
  pub notifier: Arc<MockNotifier>,
}

impl Harness {
  pub fn db(&self) -> &DatabaseConnection {
    &self.app.db
  }
}

pub async fn harness() -> Harness {
  harness_with(Policy::default()).await
}

pub async fn harness_with(policy: Policy) -> Harness {
  let db = setup_db().await;
  build(db, policy, MockProcessor::default(), MockNotifier::default())
}

pub fn build(
  db: DatabaseConnection,
  policy: Policy,
  processor: MockProcessor,
  notifier: MockNotifier,
) -> Harness {
  let processor = Arc::new(processor);
  let notifier = Arc::new(notifier);
  let gateways = Gateways {
    processor: processor.clone(),
    notifier: notifier.clone(),
    hasher: Arc::new(PlainHasher),
  };
  let config = Config { policy, ..Config::default() };

  Harness { app: AppState::with_parts(db, gateways, config), processor, notifier }
}
