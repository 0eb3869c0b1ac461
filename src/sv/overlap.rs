//! Double-booking detection. Ranges are compared inclusively:
//! `[s, e]` and `[s2, e2]` collide iff `s2 <= e && e2 >= s`.

use sea_orm::sea_query::Expr;

use crate::{
  entity::{ReservationStatus, car, car_availability, reservation},
  prelude::*,
};

#[derive(Debug, Clone, Copy)]
pub struct Probe {
  pub car_id: i32,
  pub start: DateTime,
  pub end: DateTime,
  pub exclude: Option<i32>,
  pub pending_blocks: bool,
}

impl Probe {
  pub fn new(car_id: i32, start: DateTime, end: DateTime) -> Self {
    Self { car_id, start, end, exclude: None, pending_blocks: false }
  }

  /// Ignore one reservation, usually the one being re-checked.
  pub fn excluding(mut self, reservation_id: i32) -> Self {
    self.exclude = Some(reservation_id);
    self
  }

  pub fn pending_blocks(mut self, yes: bool) -> Self {
    self.pending_blocks = yes;
    self
  }

  fn statuses(&self) -> Vec<ReservationStatus> {
    let mut statuses = ReservationStatus::BLOCKING.to_vec();
    if self.pending_blocks {
      statuses.push(ReservationStatus::Pending);
    }
    statuses
  }
}

#[derive(Debug, Clone)]
pub enum Blocker {
  Reservation(reservation::Model),
  Blackout(car_availability::Model),
}

impl Blocker {
  pub fn into_error(self) -> Error {
    match self {
      Blocker::Reservation(r) => Error::conflict(format!(
        "Car is already booked from {} to {}",
        r.start_date, r.end_date
      )),
      Blocker::Blackout(b) => Error::conflict(format!(
        "Car is unavailable from {} to {}",
        b.start_date, b.end_date
      )),
    }
  }
}

/// Takes the per-car booking lock inside `conn`'s transaction.
pub async fn lock_car<C: ConnectionTrait>(conn: &C, car_id: i32) -> Result<()> {
  let res = car::Entity::update_many()
    .col_expr(
      car::Column::LockVersion,
      Expr::col(car::Column::LockVersion).add(1),
    )
    .filter(car::Column::Id.eq(car_id))
    .exec(conn)
    .await?;

  if res.rows_affected == 0 {
    return Err(Error::NotFound("Car"));
  }
  Ok(())
}

pub async fn blocking_reservation<C: ConnectionTrait>(
  conn: &C,
  probe: &Probe,
) -> Result<Option<reservation::Model>> {
  let mut query = reservation::Entity::find()
    .filter(reservation::Column::CarId.eq(probe.car_id))
    .filter(reservation::Column::StatusId.is_in(probe.statuses()))
    .filter(reservation::Column::StartDate.lte(probe.end))
    .filter(reservation::Column::EndDate.gte(probe.start));

  if let Some(id) = probe.exclude {
    query = query.filter(reservation::Column::Id.ne(id));
  }

  Ok(query.order_by_asc(reservation::Column::StartDate).one(conn).await?)
}

pub async fn blocking_blackout<C: ConnectionTrait>(
  conn: &C,
  probe: &Probe,
) -> Result<Option<car_availability::Model>> {
  let blackout = car_availability::Entity::find()
    .filter(car_availability::Column::CarId.eq(probe.car_id))
    .filter(car_availability::Column::StartDate.lte(probe.end))
    .filter(car_availability::Column::EndDate.gte(probe.start))
    .order_by_asc(car_availability::Column::StartDate)
    .one(conn)
    .await?;
  Ok(blackout)
}

pub async fn find<C: ConnectionTrait>(
  conn: &C,
  probe: &Probe,
) -> Result<Option<Blocker>> {
  if let Some(r) = blocking_reservation(conn, probe).await? {
    return Ok(Some(Blocker::Reservation(r)));
  }
  Ok(blocking_blackout(conn, probe).await?.map(Blocker::Blackout))
}

pub async fn ensure_clear<C: ConnectionTrait>(conn: &C, probe: &Probe) -> Result<()> {
  match find(conn, probe).await? {
    Some(blocker) => Err(blocker.into_error()),
    None => Ok(()),
  }
}

pub async fn has_conflict<C: ConnectionTrait>(conn: &C, probe: &Probe) -> Result<bool> {
  Ok(find(conn, probe).await?.is_some())
}

/// Cars with a blocking reservation or blackout touching `[start, end]`.
pub async fn blocked_cars<C: ConnectionTrait>(
  conn: &C,
  start: DateTime,
  end: DateTime,
  pending_blocks: bool,
) -> Result<Vec<i32>> {
  let probe = Probe::new(0, start, end).pending_blocks(pending_blocks);

  let mut ids: Vec<i32> = reservation::Entity::find()
    .select_only()
    .column(reservation::Column::CarId)
    .filter(reservation::Column::StatusId.is_in(probe.statuses()))
    .filter(reservation::Column::StartDate.lte(end))
    .filter(reservation::Column::EndDate.gte(start))
    .into_tuple()
    .all(conn)
    .await?;

  let blackouts: Vec<i32> = car_availability::Entity::find()
    .select_only()
    .column(car_availability::Column::CarId)
    .filter(car_availability::Column::StartDate.lte(end))
    .filter(car_availability::Column::EndDate.gte(start))
    .into_tuple()
    .all(conn)
    .await?;

  ids.extend(blackouts);
  ids.sort_unstable();
  ids.dedup();
  Ok(ids)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{self, day};

  async fn booked(
    db: &DatabaseConnection,
    car_id: i32,
    start: i64,
    end: i64,
    status: ReservationStatus,
  ) -> reservation::Model {
    let owner = testing::customer(db).await;
    testing::reservation(db, owner.id, car_id, day(start), day(end), status).await
  }

  #[tokio::test]
  async fn overlap_sub_cases() {
    let db = testing::setup_db().await;
    let car = testing::car(&db, "AB-100").await;
    booked(&db, car.id, 10, 15, ReservationStatus::Confirmed).await;

    // general overlap, start-within, end-within, containment
    for (s, e) in [(8, 17), (12, 20), (5, 11), (11, 13)] {
      let probe = Probe::new(car.id, day(s), day(e));
      assert!(has_conflict(&db, &probe).await.unwrap(), "{s}..{e}");
    }
    // touching endpoints collide
    assert!(has_conflict(&db, &Probe::new(car.id, day(15), day(18))).await.unwrap());
    assert!(has_conflict(&db, &Probe::new(car.id, day(7), day(10))).await.unwrap());
    // disjoint
    assert!(!has_conflict(&db, &Probe::new(car.id, day(1), day(9))).await.unwrap());
    assert!(!has_conflict(&db, &Probe::new(car.id, day(16), day(20))).await.unwrap());
  }

  #[tokio::test]
  async fn only_blocking_statuses_count() {
    let db = testing::setup_db().await;
    let car = testing::car(&db, "AB-101").await;
    booked(&db, car.id, 10, 15, ReservationStatus::Pending).await;
    booked(&db, car.id, 10, 15, ReservationStatus::Cancelled).await;
    booked(&db, car.id, 10, 15, ReservationStatus::Completed).await;

    assert!(!has_conflict(&db, &Probe::new(car.id, day(10), day(15))).await.unwrap());

    let probe = Probe::new(car.id, day(10), day(15)).pending_blocks(true);
    assert!(matches!(find(&db, &probe).await.unwrap(), Some(Blocker::Reservation(_))));

    booked(&db, car.id, 12, 13, ReservationStatus::InProgress).await;
    assert!(has_conflict(&db, &Probe::new(car.id, day(10), day(15))).await.unwrap());
  }

  #[tokio::test]
  async fn blackouts_block_unconditionally() {
    let db = testing::setup_db().await;
    let car = testing::car(&db, "AB-102").await;
    testing::blackout(&db, car.id, day(3), day(4)).await;

    let probe = Probe::new(car.id, day(1), day(3));
    assert!(matches!(find(&db, &probe).await.unwrap(), Some(Blocker::Blackout(_))));
    assert!(!has_conflict(&db, &Probe::new(car.id, day(5), day(6))).await.unwrap());
  }

  #[tokio::test]
  async fn exclusion_and_other_cars() {
    let db = testing::setup_db().await;
    let car = testing::car(&db, "AB-103").await;
    let other = testing::car(&db, "AB-104").await;
    let r = booked(&db, car.id, 10, 15, ReservationStatus::Confirmed).await;

    let probe = Probe::new(car.id, day(10), day(15)).excluding(r.id);
    assert!(find(&db, &probe).await.unwrap().is_none());
    assert!(!has_conflict(&db, &Probe::new(other.id, day(10), day(15))).await.unwrap());

    assert_eq!(blocked_cars(&db, day(11), day(12), false).await.unwrap(), vec![car.id]);
  }

  #[tokio::test]
  async fn locking_missing_car_is_not_found() {
    let db = testing::setup_db().await;
    assert!(matches!(lock_car(&db, 999).await, Err(Error::NotFound("Car"))));
  }
}
