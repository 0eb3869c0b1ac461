use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;
use super::m20261001_000007_create_subscription_types::SubscriptionTypes;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Subscriptions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Subscriptions::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Subscriptions::UserId).integer().not_null())
          .col(
            ColumnDef::new(Subscriptions::SubscriptionTypeId)
              .integer()
              .not_null(),
          )
          .col(ColumnDef::new(Subscriptions::StartDate).date_time().not_null())
          .col(ColumnDef::new(Subscriptions::ExpiryDate).date_time().not_null())
          .col(
            ColumnDef::new(Subscriptions::Status)
              .string()
              .not_null()
              .default("active"),
          )
          .col(
            ColumnDef::new(Subscriptions::AutoRenew)
              .boolean()
              .not_null()
              .default(false),
          )
          // no foreign key: payments already reference subscriptions
          .col(ColumnDef::new(Subscriptions::PaymentId).integer().null())
          .col(ColumnDef::new(Subscriptions::CancelledAt).date_time().null())
          .col(ColumnDef::new(Subscriptions::CancelReason).text().null())
          .col(ColumnDef::new(Subscriptions::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_subscriptions_user")
              .from(Subscriptions::Table, Subscriptions::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_subscriptions_type")
              .from(Subscriptions::Table, Subscriptions::SubscriptionTypeId)
              .to(SubscriptionTypes::Table, SubscriptionTypes::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_subscriptions_user_status")
          .table(Subscriptions::Table)
          .col(Subscriptions::UserId)
          .col(Subscriptions::Status)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Subscriptions {
  Table,
  Id,
  UserId,
  SubscriptionTypeId,
  StartDate,
  ExpiryDate,
  Status,
  AutoRenew,
  PaymentId,
  CancelledAt,
  CancelReason,
  CreatedAt,
}
