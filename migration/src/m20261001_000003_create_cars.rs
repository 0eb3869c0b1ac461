use sea_orm_migration::prelude::*;

use super::m20261001_000002_create_car_categories::CarCategories;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Cars::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Cars::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Cars::Brand).string().not_null())
          .col(ColumnDef::new(Cars::Model).string().not_null())
          .col(ColumnDef::new(Cars::Year).integer().not_null())
          .col(ColumnDef::new(Cars::Color).string().not_null())
          .col(ColumnDef::new(Cars::LicensePlate).string().not_null().unique_key())
          .col(ColumnDef::new(Cars::Mileage).integer().not_null().default(0))
          .col(ColumnDef::new(Cars::CategoryId).integer().null())
          .col(ColumnDef::new(Cars::DailyPriceCents).big_integer().not_null())
          .col(ColumnDef::new(Cars::DepositCents).big_integer().not_null())
          .col(ColumnDef::new(Cars::IncludedKm).integer().not_null())
          .col(ColumnDef::new(Cars::ExtraKmPriceCents).big_integer().not_null())
          .col(ColumnDef::new(Cars::Seats).integer().not_null().default(5))
          .col(ColumnDef::new(Cars::Transmission).string().not_null())
          .col(ColumnDef::new(Cars::FuelType).string().not_null())
          .col(ColumnDef::new(Cars::Features).json().null())
          .col(
            ColumnDef::new(Cars::IsAvailable).boolean().not_null().default(true),
          )
          .col(
            ColumnDef::new(Cars::LockVersion).integer().not_null().default(0),
          )
          .col(ColumnDef::new(Cars::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Cars::UpdatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_cars_category")
              .from(Cars::Table, Cars::CategoryId)
              .to(CarCategories::Table, CarCategories::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_cars_category")
          .table(Cars::Table)
          .col(Cars::CategoryId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Cars::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Cars {
  Table,
  Id,
  Brand,
  Model,
  Year,
  Color,
  LicensePlate,
  Mileage,
  CategoryId,
  DailyPriceCents,
  DepositCents,
  IncludedKm,
  ExtraKmPriceCents,
  Seats,
  Transmission,
  FuelType,
  Features,
  IsAvailable,
  LockVersion,
  CreatedAt,
  UpdatedAt,
}
