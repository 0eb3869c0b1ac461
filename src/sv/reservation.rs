use sea_orm::SqlErr;
use serde::{Deserialize, Serialize};

use crate::{
  actor::Actor,
  entity::{
    PaymentStatus, PaymentType, ReservationStatus, car, car_category, payment,
    reservation, review, user,
  },
  gateway::{ChargeOutcome, ChargeRequest, RefundOutcome, RefundRequest},
  pricing::{self, AddOn, Money},
  prelude::*,
  state::{Gateways, Policy},
  sv::{
    overlap::{self, Probe},
    subscription,
  },
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
  pub car_id: i32,
  pub start_date: DateTime,
  pub end_date: DateTime,
  pub pickup_location: String,
  pub return_location: String,
  #[serde(default)]
  pub add_ons: Vec<AddOn>,
  pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationPatch {
  pub pickup_location: Option<String>,
  pub return_location: Option<String>,
  pub special_requests: Option<String>,
  pub add_ons: Option<Vec<AddOn>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepositRequest {
  pub method: Option<String>,
  pub details: Option<json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deposit {
  pub reservation: reservation::Model,
  pub payment: payment::Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct RentalSummary {
  pub reservation: reservation::Model,
  pub extra_fees: Option<payment::Model>,
}

fn add_ons_json(add_ons: &[AddOn]) -> Result<Option<json::Value>> {
  if add_ons.is_empty() {
    return Ok(None);
  }
  json::to_value(add_ons)
    .map(Some)
    .map_err(|err| Error::validation(format!("Invalid add-ons: {err}")))
}

fn require(status: ReservationStatus, allowed: &[ReservationStatus], action: &str) -> Result<()> {
  if allowed.contains(&status) {
    Ok(())
  } else {
    Err(Error::invalid_state(format!("Cannot {action} a {status} reservation")))
  }
}

fn not_blank(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::validation(format!("{field} is required")));
  }
  Ok(())
}

/// Writes `changes` only if the row still has the version and status we read.
async fn apply<C: ConnectionTrait>(
  conn: &C,
  current: &reservation::Model,
  mut changes: reservation::ActiveModel,
) -> Result<reservation::Model> {
  changes.version = Set(current.version + 1);
  changes.updated_at = Set(now());

  let res = reservation::Entity::update_many()
    .set(changes)
    .filter(reservation::Column::Id.eq(current.id))
    .filter(reservation::Column::Version.eq(current.version))
    .filter(reservation::Column::StatusId.eq(current.status_id))
    .exec(conn)
    .await?;

  if res.rows_affected != 1 {
    return Err(Error::conflict("Reservation was modified concurrently"));
  }

  reservation::Entity::find_by_id(current.id)
    .one(conn)
    .await?
    .ok_or(Error::NotFound("Reservation"))
}

async fn set_car_mileage<C: ConnectionTrait>(conn: &C, car_id: i32, mileage: i32) -> Result<()> {
  let res = car::Entity::update_many()
    .col_expr(car::Column::Mileage, mileage.into())
    .col_expr(car::Column::UpdatedAt, now().into())
    .filter(car::Column::Id.eq(car_id))
    .exec(conn)
    .await?;
  if res.rows_affected == 0 {
    return Err(Error::NotFound("Car"));
  }
  Ok(())
}

pub struct Reservation<'a> {
  db: &'a DatabaseConnection,
  gateways: &'a Gateways,
  policy: &'a Policy,
}

impl<'a> Reservation<'a> {
  pub fn new(db: &'a DatabaseConnection, gateways: &'a Gateways, policy: &'a Policy) -> Self {
    Self { db, gateways, policy }
  }

  async fn load(&self, id: i32) -> Result<reservation::Model> {
    reservation::Entity::find_by_id(id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("Reservation"))
  }

  pub async fn get(&self, actor: &Actor, id: i32) -> Result<reservation::Model> {
    let reservation = self.load(id).await?;
    actor.ensure_access(reservation.user_id)?;
    Ok(reservation)
  }

  pub async fn list_for_user(&self, actor: &Actor) -> Result<Vec<reservation::Model>> {
    Ok(
      reservation::Entity::find()
        .filter(reservation::Column::UserId.eq(actor.user_id))
        .order_by_desc(reservation::Column::StartDate)
        .all(self.db)
        .await?,
    )
  }

  pub async fn list_all(
    &self,
    actor: &Actor,
    status: Option<ReservationStatus>,
  ) -> Result<Vec<reservation::Model>> {
    actor.ensure_staff()?;
    let mut query = reservation::Entity::find();
    if let Some(status) = status {
      query = query.filter(reservation::Column::StatusId.eq(status));
    }
    Ok(query.order_by_desc(reservation::Column::StartDate).all(self.db).await?)
  }

  pub async fn payments(&self, actor: &Actor, id: i32) -> Result<Vec<payment::Model>> {
    let reservation = self.get(actor, id).await?;
    Ok(
      payment::Entity::find()
        .filter(payment::Column::ReservationId.eq(reservation.id))
        .order_by_asc(payment::Column::CreatedAt)
        .all(self.db)
        .await?,
    )
  }

  async fn check_category_access<C: ConnectionTrait>(
    &self,
    conn: &C,
    actor: &Actor,
    car: &car::Model,
  ) -> Result<()> {
    if !self.policy.category_gating || actor.is_staff() {
      return Ok(());
    }
    let Some(category_id) = car.category_id else { return Ok(()) };

    let category = car_category::Entity::find_by_id(category_id)
      .one(conn)
      .await?
      .ok_or(Error::NotFound("Category"))?;

    match subscription::max_category_tier(conn, actor.user_id, now()).await? {
      Some(tier) if tier >= category.tier => Ok(()),
      Some(tier) => Err(Error::forbidden(format!(
        "Subscription covers tier {tier}, `{}` requires tier {}",
        category.name, category.tier
      ))),
      None => Err(Error::forbidden(format!(
        "An active subscription is required to book `{}` cars",
        category.name
      ))),
    }
  }

  pub async fn create(
    &self,
    actor: &Actor,
    new: NewReservation,
  ) -> Result<reservation::Model> {
    pricing::rental_days(new.start_date, new.end_date)?;
    if new.start_date < now() {
      return Err(Error::validation("Start date cannot be in the past"));
    }
    not_blank("Pickup location", &new.pickup_location)?;
    not_blank("Return location", &new.return_location)?;
    let add_ons = add_ons_json(&new.add_ons)?;

    let txn = self.db.begin().await?;

    overlap::lock_car(&txn, new.car_id).await?;
    let car = car::Entity::find_by_id(new.car_id)
      .one(&txn)
      .await?
      .ok_or(Error::NotFound("Car"))?;
    if !car.is_available {
      return Err(Error::conflict("Car is not available for booking"));
    }

    user::Entity::find_by_id(actor.user_id)
      .one(&txn)
      .await?
      .ok_or(Error::NotFound("User"))?;

    self.check_category_access(&txn, actor, &car).await?;

    let probe = Probe::new(car.id, new.start_date, new.end_date)
      .pending_blocks(self.policy.pending_blocks);
    overlap::ensure_clear(&txn, &probe).await?;

    let base = pricing::compute_base_price(&car, new.start_date, new.end_date)?;
    let total = pricing::compute_total(base, &new.add_ons)?;

    let now = now();
    let reservation = reservation::ActiveModel {
      user_id: Set(actor.user_id),
      car_id: Set(car.id),
      status_id: Set(ReservationStatus::Pending),
      start_date: Set(new.start_date),
      end_date: Set(new.end_date),
      pickup_location: Set(new.pickup_location),
      return_location: Set(new.return_location),
      add_ons: Set(add_ons),
      total_price_cents: Set(total.cents()),
      deposit_cents: Set(car.deposit_cents),
      deposit_paid: Set(false),
      special_requests: Set(new.special_requests),
      version: Set(0),
      created_at: Set(now),
      updated_at: Set(now),
      ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
      "Reservation #{} created by user #{} for car #{} ({} total)",
      reservation.id, actor.user_id, car.id, total
    );
    Ok(reservation)
  }

  pub async fn update(
    &self,
    actor: &Actor,
    id: i32,
    patch: ReservationPatch,
  ) -> Result<reservation::Model> {
    let current = self.get(actor, id).await?;
    require(
      current.status(),
      &[ReservationStatus::Pending, ReservationStatus::Confirmed],
      "update",
    )?;

    let mut changes = reservation::ActiveModel { ..Default::default() };
    if let Some(pickup) = patch.pickup_location {
      not_blank("Pickup location", &pickup)?;
      changes.pickup_location = Set(pickup);
    }
    if let Some(ret) = patch.return_location {
      not_blank("Return location", &ret)?;
      changes.return_location = Set(ret);
    }
    if let Some(requests) = patch.special_requests {
      changes.special_requests = Set(Some(requests));
    }
    if let Some(add_ons) = patch.add_ons {
      let car = car::Entity::find_by_id(current.car_id)
        .one(self.db)
        .await?
        .ok_or(Error::NotFound("Car"))?;
      let base = pricing::compute_base_price(&car, current.start_date, current.end_date)?;
      let total = pricing::compute_total(base, &add_ons)?;
      changes.add_ons = Set(add_ons_json(&add_ons)?);
      changes.total_price_cents = Set(total.cents());
    }

    apply(self.db, &current, changes).await
  }

  /// Soft cancel: the row stays with its cancellation stamp.
  pub async fn cancel(
    &self,
    actor: &Actor,
    id: i32,
    reason: Option<String>,
  ) -> Result<reservation::Model> {
    let current = self.get(actor, id).await?;
    if !current.status().can_transition_to(ReservationStatus::Cancelled) {
      return Err(Error::invalid_state(format!(
        "Cannot cancel a {} reservation",
        current.status()
      )));
    }

    let cancelled = apply(self.db, &current, reservation::ActiveModel {
      status_id: Set(ReservationStatus::Cancelled),
      cancelled_at: Set(Some(now())),
      cancel_reason: Set(reason),
      ..Default::default()
    })
    .await?;

    info!("Reservation #{id} cancelled by user #{}", actor.user_id);
    Ok(cancelled)
  }

  pub async fn confirm(&self, actor: &Actor, id: i32) -> Result<reservation::Model> {
    actor.ensure_staff()?;

    let current = self.load(id).await?;
    require(current.status(), &[ReservationStatus::Pending], "confirm")?;

    let txn = self.db.begin().await?;
    overlap::lock_car(&txn, current.car_id).await?;
    let probe = Probe::new(current.car_id, current.start_date, current.end_date)
      .excluding(current.id)
      .pending_blocks(self.policy.pending_blocks);
    overlap::ensure_clear(&txn, &probe).await?;

    let confirmed = apply(&txn, &current, reservation::ActiveModel {
      status_id: Set(ReservationStatus::Confirmed),
      ..Default::default()
    })
    .await?;
    txn.commit().await?;

    info!("Reservation #{id} confirmed by user #{}", actor.user_id);
    self.notify_confirmed(&confirmed).await;
    Ok(confirmed)
  }

  async fn notify_confirmed(&self, reservation: &reservation::Model) {
    let lookup = async {
      let user = user::Entity::find_by_id(reservation.user_id).one(self.db).await?;
      let car = car::Entity::find_by_id(reservation.car_id).one(self.db).await?;
      Ok::<_, sea_orm::DbErr>(user.zip(car))
    };

    match lookup.await {
      Ok(Some((user, car))) => {
        if let Err(err) =
          self.gateways.notifier.reservation_confirmed(&user, reservation, &car).await
        {
          warn!("Confirmation for reservation #{} not sent: {err:#}", reservation.id);
        }
      }
      Ok(None) => warn!("Reservation #{} lost its user or car", reservation.id),
      Err(err) => warn!("Confirmation lookup for #{} failed: {err}", reservation.id),
    }
  }

  pub async fn pay_deposit(
    &self,
    actor: &Actor,
    id: i32,
    req: DepositRequest,
  ) -> Result<Deposit> {
    let current = self.load(id).await?;
    actor.ensure_owner(current.user_id)?;
    require(current.status(), &[ReservationStatus::Confirmed], "pay the deposit of")?;
    if !current.deposit().is_positive() {
      return Err(Error::invalid_state("This reservation carries no deposit"));
    }

    let txn = self.db.begin().await?;
    // claims the reservation against concurrent deposit attempts
    apply(&txn, &current, reservation::ActiveModel { ..Default::default() }).await?;

    let existing = payment::Entity::find()
      .filter(payment::Column::ReservationId.eq(id))
      .filter(payment::Column::PaymentType.eq(PaymentType::Deposit))
      .filter(payment::Column::Status.ne(PaymentStatus::Failed))
      .one(&txn)
      .await?;

    let pending = match existing {
      // charged by an earlier attempt whose settlement never landed
      Some(payment)
        if payment.status == PaymentStatus::Pending && payment.transaction_id.is_some() =>
      {
        txn.commit().await?;
        warn!("Resuming settlement of deposit payment #{} for reservation #{id}", payment.id);
        return self.settle_deposit(id, payment).await;
      }
      Some(payment) if payment.status == PaymentStatus::Pending => {
        return Err(Error::conflict("A deposit payment is already in progress"));
      }
      Some(_) => return Err(Error::conflict("Deposit has already been paid")),
      None if current.deposit_paid => {
        return Err(Error::conflict("Deposit has already been paid"));
      }
      None => {
        let stamp = now();
        payment::ActiveModel {
          reservation_id: Set(Some(id)),
          subscription_id: Set(None),
          amount_cents: Set(current.deposit_cents),
          payment_type: Set(PaymentType::Deposit),
          payment_method: Set(req.method.clone()),
          status: Set(PaymentStatus::Pending),
          created_at: Set(stamp),
          updated_at: Set(stamp),
          ..Default::default()
        }
        .insert(&txn)
        .await?
      }
    };
    txn.commit().await?;

    let outcome = self
      .gateways
      .processor
      .charge(ChargeRequest {
        amount: current.deposit(),
        currency: self.policy.currency.clone(),
        method: req.method,
        details: req.details,
      })
      .await;

    let (transaction_id, details) = match outcome {
      Ok(ChargeOutcome::Approved { transaction_id, details }) => (transaction_id, details),
      Ok(ChargeOutcome::Declined { code, message }) => {
        let details = json::json!({ "code": code, "message": message });
        self.fail_payment(pending, Some(details)).await?;
        return Err(Error::upstream(format!("Deposit declined: {message}")));
      }
      Err(err) => {
        error!("Deposit charge for reservation #{id} failed: {err:#}");
        self.fail_payment(pending, None).await?;
        return Err(Error::upstream("Payment processor unavailable"));
      }
    };

    // the transaction id goes in first so a failed settlement resumes without a new charge
    let charged = payment::ActiveModel {
      transaction_id: Set(Some(transaction_id.clone())),
      payment_details: Set(Some(details)),
      updated_at: Set(now()),
      ..pending.into()
    }
    .update(self.db)
    .await
    .inspect_err(|err| {
      error!(
        "Deposit for reservation #{id} charged as `{transaction_id}` but not recorded, \
         needs reconciliation: {err}"
      )
    })?;

    self.settle_deposit(id, charged).await.inspect_err(|err| {
      error!("Deposit `{transaction_id}` for reservation #{id} charged but not settled: {err}")
    })
  }

  async fn settle_deposit(&self, id: i32, charged: payment::Model) -> Result<Deposit> {
    let txn = self.db.begin().await?;
    let payment = payment::ActiveModel {
      status: Set(PaymentStatus::Completed),
      updated_at: Set(now()),
      ..charged.into()
    }
    .update(&txn)
    .await?;

    reservation::Entity::update_many()
      .col_expr(reservation::Column::DepositPaid, true.into())
      .col_expr(reservation::Column::UpdatedAt, now().into())
      .filter(reservation::Column::Id.eq(id))
      .exec(&txn)
      .await?;
    let reservation = reservation::Entity::find_by_id(id)
      .one(&txn)
      .await?
      .ok_or(Error::NotFound("Reservation"))?;
    txn.commit().await?;

    info!("Deposit {} paid for reservation #{id}", payment.amount());
    Ok(Deposit { reservation, payment })
  }

  async fn fail_payment(
    &self,
    payment: payment::Model,
    details: Option<json::Value>,
  ) -> Result<()> {
    payment::ActiveModel {
      status: Set(PaymentStatus::Failed),
      payment_details: Set(details),
      updated_at: Set(now()),
      ..payment.into()
    }
    .update(self.db)
    .await?;
    Ok(())
  }

  pub async fn start_rental(
    &self,
    actor: &Actor,
    id: i32,
    initial_mileage: i32,
  ) -> Result<reservation::Model> {
    actor.ensure_staff()?;
    let current = self.load(id).await?;
    require(current.status(), &[ReservationStatus::Confirmed], "start")?;
    if current.deposit().is_positive() && !current.deposit_paid {
      return Err(Error::invalid_state("Deposit has not been paid"));
    }

    let car = car::Entity::find_by_id(current.car_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("Car"))?;
    if initial_mileage < car.mileage {
      return Err(Error::validation(format!(
        "Initial mileage {initial_mileage} is below the recorded {}",
        car.mileage
      )));
    }

    let txn = self.db.begin().await?;
    let started = apply(&txn, &current, reservation::ActiveModel {
      status_id: Set(ReservationStatus::InProgress),
      initial_mileage: Set(Some(initial_mileage)),
      actual_start_date: Set(Some(now())),
      ..Default::default()
    })
    .await?;
    set_car_mileage(&txn, car.id, initial_mileage).await?;
    txn.commit().await?;

    info!("Rental #{id} started at {initial_mileage} km");
    Ok(started)
  }

  pub async fn end_rental(
    &self,
    actor: &Actor,
    id: i32,
    final_mileage: i32,
  ) -> Result<RentalSummary> {
    actor.ensure_staff()?;
    let current = self.load(id).await?;
    require(current.status(), &[ReservationStatus::InProgress], "end")?;
    let initial = current
      .initial_mileage
      .ok_or_else(|| Error::invalid_state("Rental has no initial mileage"))?;

    let car = car::Entity::find_by_id(current.car_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("Car"))?;
    let overage =
      pricing::mileage_overage(initial, final_mileage, car.included_km, car.extra_km_price())?;

    let txn = self.db.begin().await?;
    let completed = apply(&txn, &current, reservation::ActiveModel {
      status_id: Set(ReservationStatus::Completed),
      final_mileage: Set(Some(final_mileage)),
      km_driven: Set(Some(overage.km_driven)),
      extra_km: Set(Some(overage.extra_km)),
      extra_fees_cents: Set(Some(overage.extra_fees.cents())),
      actual_end_date: Set(Some(now())),
      ..Default::default()
    })
    .await?;
    set_car_mileage(&txn, car.id, final_mileage).await?;

    let extra_fees = if overage.extra_fees > Money::ZERO {
      let now = now();
      let payment = payment::ActiveModel {
        reservation_id: Set(Some(id)),
        subscription_id: Set(None),
        amount_cents: Set(overage.extra_fees.cents()),
        payment_type: Set(PaymentType::ExtraFees),
        status: Set(PaymentStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
      }
      .insert(&txn)
      .await?;
      Some(payment)
    } else {
      None
    };
    txn.commit().await?;

    info!(
      "Rental #{id} completed: {} km driven, {} extra fees",
      overage.km_driven, overage.extra_fees
    );
    Ok(RentalSummary { reservation: completed, extra_fees })
  }

  pub async fn add_review(
    &self,
    actor: &Actor,
    id: i32,
    rating: i32,
    comment: Option<String>,
  ) -> Result<review::Model> {
    let current = self.load(id).await?;
    actor.ensure_owner(current.user_id)?;
    require(current.status(), &[ReservationStatus::Completed], "review")?;
    if !(1..=5).contains(&rating) {
      return Err(Error::validation("Rating must be between 1 and 5"));
    }

    let existing =
      review::Entity::find().filter(review::Column::ReservationId.eq(id)).one(self.db).await?;
    if existing.is_some() {
      return Err(Error::conflict("Reservation has already been reviewed"));
    }

    let inserted = review::ActiveModel {
      reservation_id: Set(id),
      user_id: Set(current.user_id),
      car_id: Set(current.car_id),
      rating: Set(rating),
      comment: Set(comment),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(self.db)
    .await;

    match inserted {
      Ok(review) => Ok(review),
      Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
        Err(Error::conflict("Reservation has already been reviewed"))
      }
      Err(err) => Err(err.into()),
    }
  }

  /// Returns the deposit of a cancelled or completed reservation.
  pub async fn refund(
    &self,
    actor: &Actor,
    id: i32,
    reason: String,
  ) -> Result<reservation::Model> {
    actor.ensure_staff()?;
    let current = self.load(id).await?;
    if !current.status().can_transition_to(ReservationStatus::Refunded) {
      return Err(Error::invalid_state(format!(
        "Cannot refund a {} reservation",
        current.status()
      )));
    }

    let deposit = payment::Entity::find()
      .filter(payment::Column::ReservationId.eq(id))
      .filter(payment::Column::PaymentType.eq(PaymentType::Deposit))
      .filter(
        payment::Column::Status.is_in([PaymentStatus::Completed, PaymentStatus::Refunding]),
      )
      .one(self.db)
      .await?
      .ok_or_else(|| Error::invalid_state("No completed deposit to refund"))?;

    if deposit.status == PaymentStatus::Refunding {
      return match refund_id_of(&deposit) {
        Some(refund_id) => {
          warn!("Resuming refund `{refund_id}` for reservation #{id}");
          self.finish_refund(&current, deposit).await
        }
        None => Err(Error::conflict("A refund is already in progress for this deposit")),
      };
    }

    let transaction_id = deposit
      .transaction_id
      .clone()
      .ok_or_else(|| Error::invalid_state("Deposit has no transaction to refund"))?;

    let txn = self.db.begin().await?;
    let claimed = apply(&txn, &current, reservation::ActiveModel { ..Default::default() }).await?;
    let deposit =
      move_payment(&txn, deposit, PaymentStatus::Completed, PaymentStatus::Refunding).await?;
    txn.commit().await?;

    let outcome = self
      .gateways
      .processor
      .refund(RefundRequest { transaction_id, amount: deposit.amount(), reason: reason.clone() })
      .await;

    let refund_id = match outcome {
      Ok(RefundOutcome::Refunded { refund_id }) => refund_id,
      Ok(RefundOutcome::Declined { message, .. }) => {
        self.reopen_deposit(deposit).await;
        return Err(Error::upstream(format!("Refund declined: {message}")));
      }
      Err(err) => {
        error!("Refund for reservation #{id} failed: {err:#}");
        self.reopen_deposit(deposit).await;
        return Err(Error::upstream("Payment processor unavailable"));
      }
    };

    let mut details = match deposit.payment_details.clone() {
      Some(json::Value::Object(map)) => map,
      Some(other) => json::Map::from_iter([(String::from("charge"), other)]),
      None => json::Map::new(),
    };
    details.insert("refund_id".into(), json::Value::String(refund_id.clone()));
    details.insert("refund_reason".into(), json::Value::String(reason));

    // the refund id marks the money as returned; finishing is safe to retry from here
    let deposit = payment::ActiveModel {
      payment_details: Set(Some(json::Value::Object(details))),
      updated_at: Set(now()),
      ..deposit.into()
    }
    .update(self.db)
    .await
    .inspect_err(|err| {
      error!(
        "Refund `{refund_id}` for reservation #{id} went through but was not recorded, \
         needs reconciliation: {err}"
      )
    })?;

    self.finish_refund(&claimed, deposit).await.inspect_err(|err| {
      error!("Refund `{refund_id}` for reservation #{id} not settled yet: {err}")
    })
  }

  async fn finish_refund(
    &self,
    current: &reservation::Model,
    deposit: payment::Model,
  ) -> Result<reservation::Model> {
    let txn = self.db.begin().await?;
    let refunded = apply(&txn, current, reservation::ActiveModel {
      status_id: Set(ReservationStatus::Refunded),
      ..Default::default()
    })
    .await?;
    move_payment(&txn, deposit, PaymentStatus::Refunding, PaymentStatus::Refunded).await?;
    txn.commit().await?;

    info!("Reservation #{} refunded", current.id);
    Ok(refunded)
  }

  async fn reopen_deposit(&self, deposit: payment::Model) {
    let id = deposit.id;
    if let Err(err) =
      move_payment(self.db, deposit, PaymentStatus::Refunding, PaymentStatus::Completed).await
    {
      error!("Deposit payment #{id} stuck in refunding, needs reconciliation: {err}");
    }
  }
}

fn refund_id_of(payment: &payment::Model) -> Option<&str> {
  payment.payment_details.as_ref()?.get("refund_id")?.as_str()
}

/// Moves a payment between statuses only if nobody moved it first.
async fn move_payment<C: ConnectionTrait>(
  conn: &C,
  payment: payment::Model,
  from: PaymentStatus,
  to: PaymentStatus,
) -> Result<payment::Model> {
  let stamp = now();
  let res = payment::Entity::update_many()
    .set(payment::ActiveModel {
      status: Set(to),
      updated_at: Set(stamp),
      ..Default::default()
    })
    .filter(payment::Column::Id.eq(payment.id))
    .filter(payment::Column::Status.eq(from))
    .exec(conn)
    .await?;

  if res.rows_affected != 1 {
    return Err(Error::conflict("Payment was modified concurrently"));
  }
  Ok(payment::Model { status: to, updated_at: stamp, ..payment })
}
