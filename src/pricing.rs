//! Rental pricing over integer cents.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{entity::car, prelude::*};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Fixed-point amount with two fractional digits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
  pub const ZERO: Money = Money(0);

  pub const fn from_cents(cents: i64) -> Self {
    Self(cents)
  }

  pub const fn cents(self) -> i64 {
    self.0
  }

  pub fn is_positive(self) -> bool {
    self.0 > 0
  }

  pub fn checked_add(self, other: Money) -> Option<Money> {
    self.0.checked_add(other.0).map(Money)
  }

  pub fn checked_mul(self, factor: i64) -> Option<Money> {
    self.0.checked_mul(factor).map(Money)
  }
}

impl fmt::Display for Money {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if self.0 < 0 { "-" } else { "" };
    let abs = self.0.unsigned_abs();
    write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
  }
}

impl FromStr for Money {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::validation(format!("Invalid amount `{s}`"));

    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, s),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

    if whole.is_empty()
      || frac.len() > 2
      || !whole.bytes().all(|b| b.is_ascii_digit())
      || !frac.bytes().all(|b| b.is_ascii_digit())
    {
      return Err(invalid());
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 =
      if frac.is_empty() { 0 } else { format!("{frac:0<2}").parse().map_err(|_| invalid())? };

    let cents = whole.checked_mul(100).and_then(|c| c.checked_add(frac)).ok_or_else(invalid)?;
    Ok(Money(if negative { -cents } else { cents }))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
  pub name: String,
  pub price: Money,
}

/// Validates a booking range and returns the number of billable days,
/// any started day counting as a full one.
pub fn rental_days(start: DateTime, end: DateTime) -> Result<i64> {
  if start >= end {
    return Err(Error::validation("Start date must be before end date"));
  }

  let seconds = (end - start).num_seconds();
  Ok((seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY)
}

pub fn compute_base_price(
  car: &car::Model,
  start: DateTime,
  end: DateTime,
) -> Result<Money> {
  let days = rental_days(start, end)?;
  car
    .daily_price()
    .checked_mul(days)
    .ok_or_else(|| Error::validation("Rental price out of range"))
}

pub fn compute_total(base: Money, add_ons: &[AddOn]) -> Result<Money> {
  add_ons.iter().try_fold(base, |total, add_on| {
    if !add_on.price.is_positive() {
      return Err(Error::validation(format!(
        "Add-on `{}` must have a positive price",
        add_on.name
      )));
    }
    total
      .checked_add(add_on.price)
      .ok_or_else(|| Error::validation("Rental price out of range"))
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overage {
  pub km_driven: i32,
  pub extra_km: i32,
  pub extra_fees: Money,
}

pub fn mileage_overage(
  initial_mileage: i32,
  final_mileage: i32,
  included_km: i32,
  extra_km_price: Money,
) -> Result<Overage> {
  if final_mileage < initial_mileage {
    return Err(Error::validation(format!(
      "Final mileage {final_mileage} is below initial mileage {initial_mileage}"
    )));
  }

  let km_driven = final_mileage - initial_mileage;
  let extra_km = (km_driven - included_km.max(0)).max(0);
  let extra_fees = extra_km_price
    .checked_mul(extra_km as i64)
    .ok_or_else(|| Error::validation("Extra fees out of range"))?;

  Ok(Overage { km_driven, extra_km, extra_fees })
}
