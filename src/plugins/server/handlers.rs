use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use super::extract::{Path, Payload, Query};
use crate::{
  actor::Actor,
  entity::{
    ReservationStatus, Role, car, car_availability, car_category, payment,
    reservation, review, subscription, subscription_type, user,
  },
  prelude::*,
  state::AppState,
  sv::{
    fleet::{
      CarDetails, CarPatch, CarSearch, CategoryPatch, NewBlackout, NewCar,
      NewCategory, Removal, ReservedRange,
    },
    reservation::{
      Deposit, DepositRequest, NewReservation, RentalSummary, ReservationPatch,
    },
    subscription::{NewPlan, PlanPatch, SubscribeRequest, Subscribed},
    user::NewUser,
  },
};

type App = State<Arc<AppState>>;

#[derive(Debug, Serialize)]
pub struct Reply<T> {
  pub success: bool,
  pub data: T,
}

type Res<T> = Result<Json<Reply<T>>>;

fn ok<T>(data: T) -> Res<T> {
  Ok(Json(Reply { success: true, data }))
}

pub async fn health() -> &'static str {
  "OK"
}

pub async fn register(State(app): App, Payload(new): Payload<NewUser>) -> Res<user::Model> {
  ok(app.sv().user.register(new).await?)
}

#[derive(Debug, Deserialize)]
pub struct RoleReq {
  pub role: Role,
}

pub async fn set_role(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(req): Payload<RoleReq>,
) -> Res<user::Model> {
  ok(app.sv().user.set_role(&actor, id, req.role).await?)
}

pub async fn users(State(app): App, actor: Actor) -> Res<Vec<user::Model>> {
  ok(app.sv().user.all(&actor).await?)
}

#[derive(Debug, Deserialize)]
pub struct LoginReq {
  pub email: String,
  pub password: String,
}

/// Credential check for the authenticating proxy; issuing sessions is its job.
pub async fn login(State(app): App, Payload(req): Payload<LoginReq>) -> Res<user::Model> {
  ok(app.sv().user.verify_credentials(&req.email, &req.password).await?)
}

pub async fn user_subscriptions(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
) -> Res<Vec<subscription::Model>> {
  ok(app.sv().subscription.history(&actor, id).await?)
}

#[derive(Debug, Serialize)]
pub struct Stats {
  pub users: u64,
  pub active_subscriptions: u64,
}

pub async fn stats(State(app): App, actor: Actor) -> Res<Stats> {
  actor.ensure_staff()?;
  let sv = app.sv();
  ok(Stats {
    users: sv.user.count().await?,
    active_subscriptions: sv.subscription.count_active().await?,
  })
}

pub async fn categories(State(app): App) -> Res<Vec<car_category::Model>> {
  ok(app.sv().fleet.categories().await?)
}

pub async fn create_category(
  State(app): App,
  actor: Actor,
  Payload(new): Payload<NewCategory>,
) -> Res<car_category::Model> {
  ok(app.sv().fleet.create_category(&actor, new).await?)
}

pub async fn update_category(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(patch): Payload<CategoryPatch>,
) -> Res<car_category::Model> {
  ok(app.sv().fleet.update_category(&actor, id, patch).await?)
}

pub async fn delete_category(State(app): App, actor: Actor, Path(id): Path<i32>) -> Res<()> {
  ok(app.sv().fleet.delete_category(&actor, id).await?)
}

pub async fn search_cars(
  State(app): App,
  Query(search): Query<CarSearch>,
) -> Res<Vec<car::Model>> {
  ok(app.sv().fleet.search(search).await?)
}

pub async fn all_cars(State(app): App, actor: Actor) -> Res<Vec<car::Model>> {
  ok(app.sv().fleet.cars(&actor).await?)
}

pub async fn available_cars(State(app): App) -> Res<Vec<car::Model>> {
  ok(app.sv().fleet.available_cars().await?)
}

#[derive(Debug, Deserialize)]
pub struct Range {
  pub start: DateTime,
  pub end: DateTime,
}

#[derive(Debug, Serialize)]
pub struct Availability {
  pub car_id: i32,
  pub free: bool,
}

pub async fn check_availability(
  State(app): App,
  Path(id): Path<i32>,
  Query(range): Query<Range>,
) -> Res<Availability> {
  let free = app.sv().fleet.is_free(id, range.start, range.end).await?;
  ok(Availability { car_id: id, free })
}

pub async fn create_car(
  State(app): App,
  actor: Actor,
  Payload(new): Payload<NewCar>,
) -> Res<car::Model> {
  ok(app.sv().fleet.create_car(&actor, new).await?)
}

pub async fn car(State(app): App, Path(id): Path<i32>) -> Res<CarDetails> {
  ok(app.sv().fleet.car_details(id).await?)
}

pub async fn update_car(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(patch): Payload<CarPatch>,
) -> Res<car::Model> {
  ok(app.sv().fleet.update_car(&actor, id, patch).await?)
}

pub async fn remove_car(State(app): App, actor: Actor, Path(id): Path<i32>) -> Res<Removal> {
  ok(app.sv().fleet.remove_car(&actor, id).await?)
}

pub async fn reserved_dates(State(app): App, Path(id): Path<i32>) -> Res<Vec<ReservedRange>> {
  ok(app.sv().fleet.reserved_dates(id).await?)
}

pub async fn add_blackout(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(new): Payload<NewBlackout>,
) -> Res<car_availability::Model> {
  ok(app.sv().fleet.add_blackout(&actor, id, new).await?)
}

pub async fn remove_blackout(State(app): App, actor: Actor, Path(id): Path<i32>) -> Res<()> {
  ok(app.sv().fleet.remove_blackout(&actor, id).await?)
}

pub async fn my_reservations(State(app): App, actor: Actor) -> Res<Vec<reservation::Model>> {
  ok(app.sv().reservation.list_for_user(&actor).await?)
}

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
  pub status: Option<ReservationStatus>,
}

pub async fn all_reservations(
  State(app): App,
  actor: Actor,
  Query(filter): Query<StatusFilter>,
) -> Res<Vec<reservation::Model>> {
  ok(app.sv().reservation.list_all(&actor, filter.status).await?)
}

pub async fn create_reservation(
  State(app): App,
  actor: Actor,
  Payload(new): Payload<NewReservation>,
) -> Res<reservation::Model> {
  ok(app.sv().reservation.create(&actor, new).await?)
}

pub async fn reservation(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
) -> Res<reservation::Model> {
  ok(app.sv().reservation.get(&actor, id).await?)
}

pub async fn update_reservation(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(patch): Payload<ReservationPatch>,
) -> Res<reservation::Model> {
  ok(app.sv().reservation.update(&actor, id, patch).await?)
}

pub async fn reservation_payments(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
) -> Res<Vec<payment::Model>> {
  ok(app.sv().reservation.payments(&actor, id).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonReq {
  pub reason: Option<String>,
}

pub async fn cancel_reservation(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  req: Option<Payload<ReasonReq>>,
) -> Res<reservation::Model> {
  let reason = req.and_then(|Payload(req)| req.reason);
  ok(app.sv().reservation.cancel(&actor, id, reason).await?)
}

pub async fn confirm_reservation(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
) -> Res<reservation::Model> {
  ok(app.sv().reservation.confirm(&actor, id).await?)
}

pub async fn pay_deposit(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  req: Option<Payload<DepositRequest>>,
) -> Res<Deposit> {
  let req = req.map(|Payload(req)| req).unwrap_or_default();
  ok(app.sv().reservation.pay_deposit(&actor, id, req).await?)
}

#[derive(Debug, Deserialize)]
pub struct MileageReq {
  pub mileage: i32,
}

pub async fn start_rental(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(req): Payload<MileageReq>,
) -> Res<reservation::Model> {
  ok(app.sv().reservation.start_rental(&actor, id, req.mileage).await?)
}

pub async fn end_rental(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(req): Payload<MileageReq>,
) -> Res<RentalSummary> {
  ok(app.sv().reservation.end_rental(&actor, id, req.mileage).await?)
}

#[derive(Debug, Deserialize)]
pub struct ReviewReq {
  pub rating: i32,
  pub comment: Option<String>,
}

pub async fn add_review(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(req): Payload<ReviewReq>,
) -> Res<review::Model> {
  ok(app.sv().reservation.add_review(&actor, id, req.rating, req.comment).await?)
}

#[derive(Debug, Deserialize)]
pub struct RefundReq {
  pub reason: String,
}

pub async fn refund(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(req): Payload<RefundReq>,
) -> Res<reservation::Model> {
  ok(app.sv().reservation.refund(&actor, id, req.reason).await?)
}

pub async fn plans(State(app): App) -> Res<Vec<subscription_type::Model>> {
  ok(app.sv().subscription.plans().await?)
}

pub async fn create_plan(
  State(app): App,
  actor: Actor,
  Payload(new): Payload<NewPlan>,
) -> Res<subscription_type::Model> {
  ok(app.sv().subscription.create_plan(&actor, new).await?)
}

pub async fn update_plan(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  Payload(patch): Payload<PlanPatch>,
) -> Res<subscription_type::Model> {
  ok(app.sv().subscription.update_plan(&actor, id, patch).await?)
}

pub async fn delete_plan(State(app): App, actor: Actor, Path(id): Path<i32>) -> Res<()> {
  ok(app.sv().subscription.delete_plan(&actor, id).await?)
}

pub async fn subscribe(
  State(app): App,
  actor: Actor,
  Payload(req): Payload<SubscribeRequest>,
) -> Res<Subscribed> {
  ok(app.sv().subscription.subscribe(&actor, req).await?)
}

#[derive(Debug, Serialize)]
pub struct ActiveSubscription {
  pub subscription: subscription::Model,
  pub plan: subscription_type::Model,
  pub max_category_tier: i32,
}

pub async fn my_subscription(
  State(app): App,
  actor: Actor,
) -> Res<Option<ActiveSubscription>> {
  let active = app.sv().subscription.active_for_user(actor.user_id).await?;
  ok(active.map(|(subscription, plan)| ActiveSubscription {
    max_category_tier: plan.access_level(),
    subscription,
    plan,
  }))
}

pub async fn cancel_subscription(
  State(app): App,
  actor: Actor,
  Path(id): Path<i32>,
  req: Option<Payload<ReasonReq>>,
) -> Res<subscription::Model> {
  let reason = req.and_then(|Payload(req)| req.reason);
  ok(app.sv().subscription.cancel(&actor, id, reason).await?)
}
