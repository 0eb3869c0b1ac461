pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_users;
mod m20261001_000002_create_car_categories;
mod m20261001_000003_create_cars;
mod m20261001_000004_create_car_availabilities;
mod m20261001_000005_create_reservation_statuses;
mod m20261001_000006_create_reservations;
mod m20261001_000007_create_subscription_types;
mod m20261001_000008_create_subscriptions;
mod m20261001_000009_create_payments;
mod m20261001_000010_create_reviews;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20261001_000001_create_users::Migration),
      Box::new(m20261001_000002_create_car_categories::Migration),
      Box::new(m20261001_000003_create_cars::Migration),
      Box::new(m20261001_000004_create_car_availabilities::Migration),
      Box::new(m20261001_000005_create_reservation_statuses::Migration),
      Box::new(m20261001_000006_create_reservations::Migration),
      Box::new(m20261001_000007_create_subscription_types::Migration),
      Box::new(m20261001_000008_create_subscriptions::Migration),
      Box::new(m20261001_000009_create_payments::Migration),
      Box::new(m20261001_000010_create_reviews::Migration),
    ]
  }
}
