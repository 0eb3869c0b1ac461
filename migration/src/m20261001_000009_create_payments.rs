use sea_orm_migration::prelude::*;

use super::m20261001_000006_create_reservations::Reservations;
use super::m20261001_000008_create_subscriptions::Subscriptions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Payments::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Payments::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Payments::ReservationId).integer().null())
          .col(ColumnDef::new(Payments::SubscriptionId).integer().null())
          .col(ColumnDef::new(Payments::AmountCents).big_integer().not_null())
          .col(ColumnDef::new(Payments::PaymentType).string().not_null())
          .col(ColumnDef::new(Payments::PaymentMethod).string().null())
          .col(ColumnDef::new(Payments::Status).string().not_null())
          .col(ColumnDef::new(Payments::TransactionId).string().null())
          .col(ColumnDef::new(Payments::PaymentDetails).json().null())
          .col(ColumnDef::new(Payments::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Payments::UpdatedAt).date_time().not_null())
          .check(Expr::cust(
            "(reservation_id IS NULL) <> (subscription_id IS NULL)",
          ))
          .foreign_key(
            ForeignKey::create()
              .name("fk_payments_reservation")
              .from(Payments::Table, Payments::ReservationId)
              .to(Reservations::Table, Reservations::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_payments_subscription")
              .from(Payments::Table, Payments::SubscriptionId)
              .to(Subscriptions::Table, Subscriptions::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_payments_reservation")
          .table(Payments::Table)
          .col(Payments::ReservationId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Payments::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Payments {
  Table,
  Id,
  ReservationId,
  SubscriptionId,
  AmountCents,
  PaymentType,
  PaymentMethod,
  Status,
  TransactionId,
  PaymentDetails,
  CreatedAt,
  UpdatedAt,
}
