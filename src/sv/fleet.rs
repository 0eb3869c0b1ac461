use sea_orm::Iterable;
use serde::{Deserialize, Serialize};

use crate::{
  actor::Actor,
  cache::Cache,
  entity::{ReservationStatus, car, car_availability, car_category, reservation},
  pricing::Money,
  prelude::*,
  state::Policy,
  sv::overlap::{self, Probe},
};

pub const MAX_TIER: i32 = 6;

/// Statuses a reservation can still move out of.
fn open_statuses() -> Vec<ReservationStatus> {
  ReservationStatus::iter().filter(|status| !status.is_terminal()).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
  pub name: String,
  pub description: Option<String>,
  #[serde(default = "default_tier")]
  pub tier: i32,
}

fn default_tier() -> i32 {
  1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub tier: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCar {
  pub brand: String,
  pub model: String,
  pub year: i32,
  pub color: String,
  pub license_plate: String,
  #[serde(default)]
  pub mileage: i32,
  pub category_id: Option<i32>,
  pub daily_price: Money,
  pub deposit: Money,
  pub included_km: i32,
  pub extra_km_price: Money,
  pub seats: i32,
  pub transmission: String,
  pub fuel_type: String,
  pub features: Option<json::Value>,
}

/// Mileage is absent on purpose: only rentals move the odometer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarPatch {
  pub brand: Option<String>,
  pub model: Option<String>,
  pub year: Option<i32>,
  pub color: Option<String>,
  pub license_plate: Option<String>,
  pub category_id: Option<Option<i32>>,
  pub daily_price: Option<Money>,
  pub deposit: Option<Money>,
  pub included_km: Option<i32>,
  pub extra_km_price: Option<Money>,
  pub seats: Option<i32>,
  pub transmission: Option<String>,
  pub fuel_type: Option<String>,
  pub features: Option<json::Value>,
  pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarSearch {
  pub category_id: Option<i32>,
  pub min_price: Option<Money>,
  pub max_price: Option<Money>,
  pub start: Option<DateTime>,
  pub end: Option<DateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBlackout {
  pub start: DateTime,
  pub end: DateTime,
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservedRange {
  pub start: DateTime,
  pub end: DateTime,
  pub status: ReservationStatus,
  /// Firm hold; a tentative one may still be declined.
  pub blocking: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarDetails {
  #[serde(flatten)]
  pub car: car::Model,
  pub blackouts: Vec<car_availability::Model>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
  Deleted,
  /// Rental history keeps the row; the car is only withdrawn from booking.
  Retired,
}

fn check_tier(tier: i32) -> Result<()> {
  if (1..=MAX_TIER).contains(&tier) {
    Ok(())
  } else {
    Err(Error::validation(format!("Tier must be between 1 and {MAX_TIER}")))
  }
}

fn check_rates(
  daily_price: Money,
  deposit: Money,
  included_km: i32,
  extra_km_price: Money,
) -> Result<()> {
  if !daily_price.is_positive() {
    return Err(Error::validation("Daily price must be positive"));
  }
  if deposit < Money::ZERO || extra_km_price < Money::ZERO {
    return Err(Error::validation("Prices cannot be negative"));
  }
  if included_km < 0 {
    return Err(Error::validation("Included km cannot be negative"));
  }
  Ok(())
}

fn not_blank(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::validation(format!("{field} is required")));
  }
  Ok(())
}

pub struct Fleet<'a> {
  db: &'a DatabaseConnection,
  cache: &'a Cache,
  policy: &'a Policy,
}

impl<'a> Fleet<'a> {
  pub fn new(db: &'a DatabaseConnection, cache: &'a Cache, policy: &'a Policy) -> Self {
    Self { db, cache, policy }
  }

  pub async fn categories(&self) -> Result<Vec<car_category::Model>> {
    if let Some(categories) = self.cache.categories.get(&()) {
      return Ok(categories);
    }

    let categories = car_category::Entity::find()
      .order_by_asc(car_category::Column::Tier)
      .order_by_asc(car_category::Column::Name)
      .all(self.db)
      .await?;

    self.cache.categories.insert((), categories.clone());
    Ok(categories)
  }

  pub async fn category(&self, id: i32) -> Result<car_category::Model> {
    car_category::Entity::find_by_id(id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("Category"))
  }

  async fn ensure_category_name_free(&self, name: &str, except: Option<i32>) -> Result<()> {
    let mut query =
      car_category::Entity::find().filter(car_category::Column::Name.eq(name));
    if let Some(id) = except {
      query = query.filter(car_category::Column::Id.ne(id));
    }
    if query.one(self.db).await?.is_some() {
      return Err(Error::conflict(format!("Category `{name}` already exists")));
    }
    Ok(())
  }

  pub async fn create_category(
    &self,
    actor: &Actor,
    new: NewCategory,
  ) -> Result<car_category::Model> {
    actor.ensure_staff()?;
    not_blank("Name", &new.name)?;
    check_tier(new.tier)?;
    self.ensure_category_name_free(new.name.trim(), None).await?;

    let category = car_category::ActiveModel {
      name: Set(new.name.trim().to_string()),
      description: Set(new.description),
      tier: Set(new.tier),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    self.cache.categories.invalidate(&());
    info!("Category `{}` created (tier {})", category.name, category.tier);
    Ok(category)
  }

  pub async fn update_category(
    &self,
    actor: &Actor,
    id: i32,
    patch: CategoryPatch,
  ) -> Result<car_category::Model> {
    actor.ensure_staff()?;
    let category = self.category(id).await?;
    let mut active: car_category::ActiveModel = category.into();

    if let Some(name) = patch.name {
      not_blank("Name", &name)?;
      self.ensure_category_name_free(name.trim(), Some(id)).await?;
      active.name = Set(name.trim().to_string());
    }
    if let Some(description) = patch.description {
      active.description = Set(Some(description));
    }
    if let Some(tier) = patch.tier {
      check_tier(tier)?;
      active.tier = Set(tier);
    }

    let category = active.update(self.db).await?;
    self.cache.categories.invalidate(&());
    Ok(category)
  }

  pub async fn delete_category(&self, actor: &Actor, id: i32) -> Result<()> {
    actor.ensure_staff()?;
    let category = self.category(id).await?;

    let cars = car::Entity::find()
      .filter(car::Column::CategoryId.eq(id))
      .count(self.db)
      .await?;
    if cars > 0 {
      return Err(Error::conflict(format!(
        "Category `{}` is used by {cars} car(s)",
        category.name
      )));
    }

    car_category::Entity::delete_by_id(id).exec(self.db).await?;
    self.cache.categories.invalidate(&());
    Ok(())
  }

  pub async fn car(&self, id: i32) -> Result<car::Model> {
    car::Entity::find_by_id(id).one(self.db).await?.ok_or(Error::NotFound("Car"))
  }

  pub async fn car_details(&self, id: i32) -> Result<CarDetails> {
    let car = self.car(id).await?;
    let blackouts = car_availability::Entity::find()
      .filter(car_availability::Column::CarId.eq(id))
      .order_by_asc(car_availability::Column::StartDate)
      .all(self.db)
      .await?;
    Ok(CarDetails { car, blackouts })
  }

  /// Whole fleet, retired cars included.
  pub async fn cars(&self, actor: &Actor) -> Result<Vec<car::Model>> {
    actor.ensure_staff()?;
    Ok(car::Entity::find().order_by_asc(car::Column::Id).all(self.db).await?)
  }

  pub async fn available_cars(&self) -> Result<Vec<car::Model>> {
    Ok(
      car::Entity::find()
        .filter(car::Column::IsAvailable.eq(true))
        .order_by_asc(car::Column::DailyPriceCents)
        .all(self.db)
        .await?,
    )
  }

  /// Bookable cars matching the filters. With a date range, cars
  /// blocked anywhere in it are left out.
  pub async fn search(&self, search: CarSearch) -> Result<Vec<car::Model>> {
    let mut query = car::Entity::find().filter(car::Column::IsAvailable.eq(true));

    if let Some(category_id) = search.category_id {
      query = query.filter(car::Column::CategoryId.eq(category_id));
    }
    if let Some(min) = search.min_price {
      query = query.filter(car::Column::DailyPriceCents.gte(min.cents()));
    }
    if let Some(max) = search.max_price {
      query = query.filter(car::Column::DailyPriceCents.lte(max.cents()));
    }

    match (search.start, search.end) {
      (Some(start), Some(end)) => {
        if start >= end {
          return Err(Error::validation("Start date must be before end date"));
        }
        let blocked =
          overlap::blocked_cars(self.db, start, end, self.policy.pending_blocks).await?;
        if !blocked.is_empty() {
          query = query.filter(car::Column::Id.is_not_in(blocked));
        }
      }
      (None, None) => {}
      _ => return Err(Error::validation("Both start and end dates are required")),
    }

    Ok(query.order_by_asc(car::Column::DailyPriceCents).all(self.db).await?)
  }

  /// Whether `car_id` could be booked for `[start, end]` right now.
  pub async fn is_free(&self, car_id: i32, start: DateTime, end: DateTime) -> Result<bool> {
    if start >= end {
      return Err(Error::validation("Start date must be before end date"));
    }
    let car = self.car(car_id).await?;
    if !car.is_available {
      return Ok(false);
    }
    let probe = Probe::new(car.id, start, end).pending_blocks(self.policy.pending_blocks);
    Ok(!overlap::has_conflict(self.db, &probe).await?)
  }

  async fn ensure_plate_free(&self, plate: &str, except: Option<i32>) -> Result<()> {
    let mut query = car::Entity::find().filter(car::Column::LicensePlate.eq(plate));
    if let Some(id) = except {
      query = query.filter(car::Column::Id.ne(id));
    }
    if query.one(self.db).await?.is_some() {
      return Err(Error::conflict(format!("License plate `{plate}` is already registered")));
    }
    Ok(())
  }

  pub async fn create_car(&self, actor: &Actor, new: NewCar) -> Result<car::Model> {
    actor.ensure_staff()?;
    not_blank("Brand", &new.brand)?;
    not_blank("Model", &new.model)?;
    not_blank("License plate", &new.license_plate)?;
    check_rates(new.daily_price, new.deposit, new.included_km, new.extra_km_price)?;
    if new.mileage < 0 {
      return Err(Error::validation("Mileage cannot be negative"));
    }
    if new.seats < 1 {
      return Err(Error::validation("A car needs at least one seat"));
    }
    if let Some(category_id) = new.category_id {
      self.category(category_id).await?;
    }

    let plate = new.license_plate.trim().to_uppercase();
    self.ensure_plate_free(&plate, None).await?;

    let now = now();
    let car = car::ActiveModel {
      brand: Set(new.brand),
      model: Set(new.model),
      year: Set(new.year),
      color: Set(new.color),
      license_plate: Set(plate),
      mileage: Set(new.mileage),
      category_id: Set(new.category_id),
      daily_price_cents: Set(new.daily_price.cents()),
      deposit_cents: Set(new.deposit.cents()),
      included_km: Set(new.included_km),
      extra_km_price_cents: Set(new.extra_km_price.cents()),
      seats: Set(new.seats),
      transmission: Set(new.transmission),
      fuel_type: Set(new.fuel_type),
      features: Set(new.features),
      is_available: Set(true),
      lock_version: Set(0),
      created_at: Set(now),
      updated_at: Set(now),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    info!("Car #{} ({}) added to the fleet", car.id, car.license_plate);
    Ok(car)
  }

  pub async fn update_car(
    &self,
    actor: &Actor,
    id: i32,
    patch: CarPatch,
  ) -> Result<car::Model> {
    actor.ensure_staff()?;
    let car = self.car(id).await?;

    check_rates(
      patch.daily_price.unwrap_or(car.daily_price()),
      patch.deposit.unwrap_or(car.deposit()),
      patch.included_km.unwrap_or(car.included_km),
      patch.extra_km_price.unwrap_or(car.extra_km_price()),
    )?;

    let mut active: car::ActiveModel = car.into();

    if let Some(plate) = patch.license_plate {
      not_blank("License plate", &plate)?;
      let plate = plate.trim().to_uppercase();
      self.ensure_plate_free(&plate, Some(id)).await?;
      active.license_plate = Set(plate);
    }
    if let Some(category_id) = patch.category_id {
      if let Some(category_id) = category_id {
        self.category(category_id).await?;
      }
      active.category_id = Set(category_id);
    }
    if let Some(seats) = patch.seats {
      if seats < 1 {
        return Err(Error::validation("A car needs at least one seat"));
      }
      active.seats = Set(seats);
    }
    if let Some(brand) = patch.brand {
      active.brand = Set(brand);
    }
    if let Some(model) = patch.model {
      active.model = Set(model);
    }
    if let Some(year) = patch.year {
      active.year = Set(year);
    }
    if let Some(color) = patch.color {
      active.color = Set(color);
    }
    if let Some(price) = patch.daily_price {
      active.daily_price_cents = Set(price.cents());
    }
    if let Some(deposit) = patch.deposit {
      active.deposit_cents = Set(deposit.cents());
    }
    if let Some(km) = patch.included_km {
      active.included_km = Set(km);
    }
    if let Some(price) = patch.extra_km_price {
      active.extra_km_price_cents = Set(price.cents());
    }
    if let Some(transmission) = patch.transmission {
      active.transmission = Set(transmission);
    }
    if let Some(fuel_type) = patch.fuel_type {
      active.fuel_type = Set(fuel_type);
    }
    if let Some(features) = patch.features {
      active.features = Set(Some(features));
    }
    if let Some(available) = patch.is_available {
      active.is_available = Set(available);
    }
    active.updated_at = Set(now());

    Ok(active.update(self.db).await?)
  }

  pub async fn remove_car(&self, actor: &Actor, id: i32) -> Result<Removal> {
    actor.ensure_staff()?;
    let car = self.car(id).await?;

    let active = reservation::Entity::find()
      .filter(reservation::Column::CarId.eq(id))
      .filter(reservation::Column::StatusId.is_in(open_statuses()))
      .count(self.db)
      .await?;
    if active > 0 {
      return Err(Error::conflict(format!("Car has {active} active reservation(s)")));
    }

    let history = reservation::Entity::find()
      .filter(reservation::Column::CarId.eq(id))
      .count(self.db)
      .await?;
    if history > 0 {
      car::ActiveModel {
        is_available: Set(false),
        updated_at: Set(now()),
        ..car.into()
      }
      .update(self.db)
      .await?;
      info!("Car #{id} retired");
      return Ok(Removal::Retired);
    }

    car::Entity::delete_by_id(id).exec(self.db).await?;
    info!("Car #{id} deleted");
    Ok(Removal::Deleted)
  }

  /// Calendar feed of held dates, including pending requests.
  pub async fn reserved_dates(&self, car_id: i32) -> Result<Vec<ReservedRange>> {
    self.car(car_id).await?;

    let ranges = reservation::Entity::find()
      .select_only()
      .column(reservation::Column::StartDate)
      .column(reservation::Column::EndDate)
      .column(reservation::Column::StatusId)
      .filter(reservation::Column::CarId.eq(car_id))
      .filter(reservation::Column::StatusId.is_in(open_statuses()))
      .order_by_asc(reservation::Column::StartDate)
      .into_tuple::<(DateTime, DateTime, ReservationStatus)>()
      .all(self.db)
      .await?;

    Ok(
      ranges
        .into_iter()
        .map(|(start, end, status)| ReservedRange {
          start,
          end,
          status,
          blocking: status.is_blocking(),
        })
        .collect(),
    )
  }

  pub async fn add_blackout(
    &self,
    actor: &Actor,
    car_id: i32,
    new: NewBlackout,
  ) -> Result<car_availability::Model> {
    actor.ensure_staff()?;
    if new.start >= new.end {
      return Err(Error::validation("Start date must be before end date"));
    }

    let txn = self.db.begin().await?;
    overlap::lock_car(&txn, car_id).await?;
    overlap::ensure_clear(&txn, &Probe::new(car_id, new.start, new.end)).await?;

    let blackout = car_availability::ActiveModel {
      car_id: Set(car_id),
      start_date: Set(new.start),
      end_date: Set(new.end),
      reason: Set(new.reason),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(
      "Car #{car_id} blacked out from {} to {}",
      blackout.start_date, blackout.end_date
    );
    Ok(blackout)
  }

  pub async fn remove_blackout(&self, actor: &Actor, id: i32) -> Result<()> {
    actor.ensure_staff()?;
    let res = car_availability::Entity::delete_by_id(id).exec(self.db).await?;
    if res.rows_affected == 0 {
      return Err(Error::NotFound("Blackout"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::Role,
    testing::{self, day},
  };

  fn staff() -> Actor {
    Actor::new(1, Role::Manager)
  }

  fn new_car(plate: &str) -> NewCar {
    NewCar {
      brand: "Toyota".into(),
      model: "Yaris".into(),
      year: 2023,
      color: "red".into(),
      license_plate: plate.into(),
      mileage: 12000,
      category_id: None,
      daily_price: Money::from_cents(4200),
      deposit: Money::from_cents(20000),
      included_km: 150,
      extra_km_price: Money::from_cents(30),
      seats: 5,
      transmission: "automatic".into(),
      fuel_type: "hybrid".into(),
      features: None,
    }
  }

  #[tokio::test]
  async fn customers_cannot_manage_fleet() {
    let h = testing::harness().await;
    let sv = h.app.sv();

    let res = sv.fleet.create_car(&Actor::customer(5), new_car("XY-1")).await;
    assert!(matches!(res, Err(Error::Forbidden(_))));
  }

  #[tokio::test]
  async fn plates_are_unique() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;

    let car = fleet.create_car(&staff(), new_car("xy-100")).await.unwrap();
    assert_eq!(car.license_plate, "XY-100");

    let dup = fleet.create_car(&staff(), new_car("XY-100")).await;
    assert!(matches!(dup, Err(Error::Conflict(_))));

    let other = fleet.create_car(&staff(), new_car("XY-200")).await.unwrap();
    let patch = CarPatch { license_plate: Some("XY-100".into()), ..Default::default() };
    assert!(matches!(
      fleet.update_car(&staff(), other.id, patch).await,
      Err(Error::Conflict(_))
    ));

    // keeping its own plate is fine
    let patch = CarPatch {
      license_plate: Some("XY-200".into()),
      color: Some("blue".into()),
      ..Default::default()
    };
    let updated = fleet.update_car(&staff(), other.id, patch).await.unwrap();
    assert_eq!(updated.color, "blue");
    assert_eq!(updated.mileage, 12000);
  }

  #[tokio::test]
  async fn invalid_rates_are_rejected() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;

    let mut car = new_car("XY-300");
    car.daily_price = Money::ZERO;
    assert!(matches!(fleet.create_car(&staff(), car).await, Err(Error::Validation(_))));

    let car = fleet.create_car(&staff(), new_car("XY-301")).await.unwrap();
    let patch = CarPatch { included_km: Some(-1), ..Default::default() };
    assert!(matches!(
      fleet.update_car(&staff(), car.id, patch).await,
      Err(Error::Validation(_))
    ));
  }

  #[tokio::test]
  async fn category_lifecycle() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;

    let economy = fleet
      .create_category(&staff(), NewCategory {
        name: "Economy".into(),
        description: None,
        tier: 1,
      })
      .await
      .unwrap();
    assert_eq!(fleet.categories().await.unwrap().len(), 1);

    let dup = fleet
      .create_category(&staff(), NewCategory {
        name: "Economy".into(),
        description: None,
        tier: 2,
      })
      .await;
    assert!(matches!(dup, Err(Error::Conflict(_))));

    let bad = fleet
      .create_category(&staff(), NewCategory { name: "Space".into(), description: None, tier: 9 })
      .await;
    assert!(matches!(bad, Err(Error::Validation(_))));

    let car = testing::car_in(h.db(), "CAT-1", Some(economy.id)).await;
    assert!(matches!(
      fleet.delete_category(&staff(), economy.id).await,
      Err(Error::Conflict(_))
    ));

    fleet.remove_car(&staff(), car.id).await.unwrap();
    fleet.delete_category(&staff(), economy.id).await.unwrap();
    assert!(fleet.categories().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn category_cache_is_invalidated_on_write() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;

    assert!(fleet.categories().await.unwrap().is_empty());
    testing::category(h.db(), 2).await;
    // direct insert bypasses the cache
    assert!(fleet.categories().await.unwrap().is_empty());

    fleet
      .create_category(&staff(), NewCategory { name: "SUV".into(), description: None, tier: 3 })
      .await
      .unwrap();
    assert_eq!(fleet.categories().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn search_excludes_blocked_cars() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;
    let owner = testing::customer(h.db()).await;

    let booked = testing::car(h.db(), "S-1").await;
    let serviced = testing::car(h.db(), "S-2").await;
    let free = testing::car(h.db(), "S-3").await;
    let pending = testing::car(h.db(), "S-4").await;

    testing::reservation(h.db(), owner.id, booked.id, day(2), day(5), ReservationStatus::Confirmed)
      .await;
    testing::reservation(h.db(), owner.id, pending.id, day(2), day(5), ReservationStatus::Pending)
      .await;
    testing::blackout(h.db(), serviced.id, day(4), day(6)).await;

    let found = fleet
      .search(CarSearch { start: Some(day(3)), end: Some(day(4)), ..Default::default() })
      .await
      .unwrap();
    let ids: Vec<_> = found.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&free.id));
    assert!(ids.contains(&pending.id));

    let cheap = fleet
      .search(CarSearch { max_price: Some(Money::from_cents(1000)), ..Default::default() })
      .await
      .unwrap();
    assert!(cheap.is_empty());

    let half = fleet.search(CarSearch { start: Some(day(3)), ..Default::default() }).await;
    assert!(matches!(half, Err(Error::Validation(_))));
  }

  #[tokio::test]
  async fn search_agrees_with_booking_when_pending_blocks() {
    let policy = Policy { pending_blocks: true, ..Policy::default() };
    let h = testing::harness_with(policy).await;
    let sv = h.app.sv();
    let car = testing::car(h.db(), "PB-1").await;

    let first = Actor::customer(testing::customer(h.db()).await.id);
    let booking = |start, end| crate::sv::reservation::NewReservation {
      car_id: car.id,
      start_date: day(start),
      end_date: day(end),
      pickup_location: "Airport".into(),
      return_location: "Airport".into(),
      add_ons: vec![],
      special_requests: None,
    };
    sv.reservation.create(&first, booking(0, 3)).await.unwrap();

    let found = sv
      .fleet
      .search(CarSearch { start: Some(day(1)), end: Some(day(2)), ..Default::default() })
      .await
      .unwrap();
    assert!(found.is_empty());
    assert!(!sv.fleet.is_free(car.id, day(1), day(2)).await.unwrap());

    let second = Actor::customer(testing::customer(h.db()).await.id);
    let res = sv.reservation.create(&second, booking(1, 2)).await;
    assert!(matches!(res, Err(Error::Conflict(_))));
  }

  #[tokio::test]
  async fn availability_checks() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;
    let owner = testing::customer(h.db()).await;
    let car = testing::car(h.db(), "AV-1").await;
    let retired = testing::car(h.db(), "AV-2").await;

    testing::reservation(h.db(), owner.id, car.id, day(2), day(4), ReservationStatus::Confirmed)
      .await;
    assert!(!fleet.is_free(car.id, day(3), day(5)).await.unwrap());
    assert!(fleet.is_free(car.id, day(5), day(7)).await.unwrap());
    assert!(matches!(
      fleet.is_free(car.id, day(5), day(5)).await,
      Err(Error::Validation(_))
    ));
    assert!(matches!(fleet.is_free(404, day(5), day(7)).await, Err(Error::NotFound("Car"))));

    let patch = CarPatch { is_available: Some(false), ..Default::default() };
    fleet.update_car(&staff(), retired.id, patch).await.unwrap();
    assert!(!fleet.is_free(retired.id, day(5), day(7)).await.unwrap());

    let available: Vec<_> = fleet.available_cars().await.unwrap().iter().map(|c| c.id).collect();
    assert_eq!(available, vec![car.id]);
    assert_eq!(fleet.cars(&staff()).await.unwrap().len(), 2);
    assert!(matches!(fleet.cars(&Actor::customer(owner.id)).await, Err(Error::Forbidden(_))));
  }

  #[tokio::test]
  async fn blackout_must_not_overlap_active_reservation() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;
    let owner = testing::customer(h.db()).await;
    let car = testing::car(h.db(), "B-1").await;

    testing::reservation(h.db(), owner.id, car.id, day(2), day(5), ReservationStatus::Confirmed)
      .await;

    let clash = NewBlackout { start: day(4), end: day(8), reason: None };
    assert!(matches!(
      fleet.add_blackout(&staff(), car.id, clash).await,
      Err(Error::Conflict(_))
    ));

    let ok = NewBlackout { start: day(6), end: day(8), reason: Some("tyres".into()) };
    let blackout = fleet.add_blackout(&staff(), car.id, ok).await.unwrap();

    let inverted = NewBlackout { start: day(9), end: day(9), reason: None };
    assert!(matches!(
      fleet.add_blackout(&staff(), car.id, inverted).await,
      Err(Error::Validation(_))
    ));

    let details = fleet.car_details(car.id).await.unwrap();
    assert_eq!(details.blackouts.len(), 1);

    fleet.remove_blackout(&staff(), blackout.id).await.unwrap();
    assert!(matches!(
      fleet.remove_blackout(&staff(), blackout.id).await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn blackout_on_missing_car() {
    let h = testing::harness().await;
    let new = NewBlackout { start: day(1), end: day(2), reason: None };
    assert!(matches!(
      h.app.sv().fleet.add_blackout(&staff(), 404, new).await,
      Err(Error::NotFound("Car"))
    ));
  }

  #[tokio::test]
  async fn reserved_dates_feed() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;
    let owner = testing::customer(h.db()).await;
    let car = testing::car(h.db(), "R-1").await;

    testing::reservation(h.db(), owner.id, car.id, day(8), day(9), ReservationStatus::Pending)
      .await;
    testing::reservation(h.db(), owner.id, car.id, day(1), day(3), ReservationStatus::Confirmed)
      .await;
    testing::reservation(h.db(), owner.id, car.id, day(4), day(5), ReservationStatus::Cancelled)
      .await;

    let ranges = fleet.reserved_dates(car.id).await.unwrap();
    assert_eq!(ranges, vec![
      ReservedRange {
        start: day(1),
        end: day(3),
        status: ReservationStatus::Confirmed,
        blocking: true,
      },
      ReservedRange {
        start: day(8),
        end: day(9),
        status: ReservationStatus::Pending,
        blocking: false,
      },
    ]);
  }

  #[tokio::test]
  async fn cars_with_history_are_retired() {
    let h = testing::harness().await;
    let fleet = h.app.sv().fleet;
    let owner = testing::customer(h.db()).await;

    let busy = testing::car(h.db(), "D-1").await;
    testing::reservation(h.db(), owner.id, busy.id, day(1), day(2), ReservationStatus::InProgress)
      .await;
    assert!(matches!(fleet.remove_car(&staff(), busy.id).await, Err(Error::Conflict(_))));

    let used = testing::car(h.db(), "D-2").await;
    testing::reservation(h.db(), owner.id, used.id, day(1), day(2), ReservationStatus::Completed)
      .await;
    assert_eq!(fleet.remove_car(&staff(), used.id).await.unwrap(), Removal::Retired);
    assert!(!fleet.car(used.id).await.unwrap().is_available);

    let fresh = testing::car(h.db(), "D-3").await;
    assert_eq!(fleet.remove_car(&staff(), fresh.id).await.unwrap(), Removal::Deleted);
    assert!(matches!(fleet.car(fresh.id).await, Err(Error::NotFound(_))));
  }
}
