//! Extractors whose rejections use the API error body.

use axum::{
  extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request},
  http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::{actor::Actor, entity::Role, prelude::*};

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct Path<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct Query<T>(pub T);

/// JSON request body.
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = Error;

  async fn from_request(req: Request, state: &S) -> Result<Self> {
    let axum::Json(value) = <axum::Json<T> as FromRequest<S>>::from_request(req, state).await?;
    Ok(Self(value))
  }
}

/// Absent body (no content type) is `None`; a malformed one is still rejected.
impl<T, S> OptionalFromRequest<S> for Payload<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = Error;

  async fn from_request(req: Request, state: &S) -> Result<Option<Self>> {
    let value =
      <axum::Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
    Ok(value.map(|axum::Json(value)| Self(value)))
  }
}

fn parse_role(raw: &str) -> Option<Role> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "admin" => Some(Role::Admin),
    "manager" => Some(Role::Manager),
    "customer" => Some(Role::Customer),
    _ => None,
  }
}

/// Identity is set by the authenticating proxy in `x-user-id` / `x-user-role`.
impl<S: Send + Sync> FromRequestParts<S> for Actor {
  type Rejection = Error;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self> {
    let header = |name: &str| {
      parts.headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
    };

    let user_id = header("x-user-id")
      .and_then(|id| id.trim().parse().ok())
      .ok_or_else(|| Error::forbidden("Missing caller identity"))?;
    let role = match header("x-user-role") {
      Some(raw) => parse_role(&raw).ok_or_else(|| Error::forbidden("Unknown role"))?,
      None => Role::Customer,
    };

    Ok(Actor::new(user_id, role))
  }
}
