mod extract;
mod handlers;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
  Router,
  routing::{delete, get, patch, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub fn router(app: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(handlers::health))
    .route("/api/auth/login", post(handlers::login))
    .route("/api/users", get(handlers::users).post(handlers::register))
    .route("/api/users/{id}/role", patch(handlers::set_role))
    .route("/api/users/{id}/subscriptions", get(handlers::user_subscriptions))
    .route("/api/admin/stats", get(handlers::stats))
    .route("/api/categories", get(handlers::categories).post(handlers::create_category))
    .route(
      "/api/categories/{id}",
      patch(handlers::update_category).delete(handlers::delete_category),
    )
    .route("/api/cars", get(handlers::search_cars).post(handlers::create_car))
    .route("/api/cars/available", get(handlers::available_cars))
    .route("/api/admin/cars", get(handlers::all_cars))
    .route(
      "/api/cars/{id}",
      get(handlers::car).patch(handlers::update_car).delete(handlers::remove_car),
    )
    .route("/api/cars/{id}/reserved-dates", get(handlers::reserved_dates))
    .route("/api/cars/{id}/availability", get(handlers::check_availability))
    .route("/api/cars/{id}/blackouts", post(handlers::add_blackout))
    .route("/api/blackouts/{id}", delete(handlers::remove_blackout))
    .route(
      "/api/reservations",
      get(handlers::my_reservations).post(handlers::create_reservation),
    )
    .route("/api/admin/reservations", get(handlers::all_reservations))
    .route(
      "/api/reservations/{id}",
      get(handlers::reservation).patch(handlers::update_reservation),
    )
    .route("/api/reservations/{id}/payments", get(handlers::reservation_payments))
    .route("/api/reservations/{id}/cancel", post(handlers::cancel_reservation))
    .route("/api/reservations/{id}/confirm", post(handlers::confirm_reservation))
    .route("/api/reservations/{id}/deposit", post(handlers::pay_deposit))
    .route("/api/reservations/{id}/start", post(handlers::start_rental))
    .route("/api/reservations/{id}/end", post(handlers::end_rental))
    .route("/api/reservations/{id}/review", post(handlers::add_review))
    .route("/api/reservations/{id}/refund", post(handlers::refund))
    .route(
      "/api/subscription-types",
      get(handlers::plans).post(handlers::create_plan),
    )
    .route(
      "/api/subscription-types/{id}",
      patch(handlers::update_plan).delete(handlers::delete_plan),
    )
    .route("/api/subscriptions", post(handlers::subscribe))
    .route("/api/subscriptions/me", get(handlers::my_subscription))
    .route("/api/subscriptions/{id}/cancel", post(handlers::cancel_subscription))
    .with_state(app)
}

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  fn name(&self) -> &'static str {
    "http"
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let limiter = governor_conf.limiter().clone();
    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));

    let router = router(app)
      .layer(
        ServiceBuilder::new()
          .layer(TraceLayer::new_for_http())
          .layer(GovernorLayer::new(governor_conf))
          .layer(
            CorsLayer::new()
              .allow_origin(Any)
              .allow_methods(Any)
              .allow_headers(Any),
          ),
      )
      .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP Server listening on {addr}");

    let limiter = async {
      loop {
        time::sleep(Duration::from_secs(60)).await;
        limiter.retain_recent();
      }
    };

    let server = async {
      axum::serve(listener, router).await.context("Axum server error")
    };

    tokio::select! {
      result = server => {
        match &result {
          Ok(_) => info!("Server stopped gracefully"),
          Err(err) => error!("Server stopped with error: {err}"),
        }
        result
      }
      _ = limiter => {
        error!("Rate limiter cleaner stopped unexpectedly!");
        Ok(())
      }
    }
  }
}
