use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(SubscriptionTypes::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(SubscriptionTypes::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(SubscriptionTypes::Name)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(SubscriptionTypes::Description).text().null())
          .col(
            ColumnDef::new(SubscriptionTypes::PriceCents).big_integer().not_null(),
          )
          .col(
            ColumnDef::new(SubscriptionTypes::DurationDays)
              .integer()
              .not_null()
              .default(30),
          )
          .col(ColumnDef::new(SubscriptionTypes::Level).integer().null())
          .col(ColumnDef::new(SubscriptionTypes::Features).json().null())
          .col(
            ColumnDef::new(SubscriptionTypes::CreatedAt).date_time().not_null(),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(SubscriptionTypes::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum SubscriptionTypes {
  Table,
  Id,
  Name,
  Description,
  PriceCents,
  DurationDays,
  Level,
  Features,
  CreatedAt,
}
