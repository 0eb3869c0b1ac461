use sea_orm_migration::prelude::*;

use super::m20261001_000003_create_cars::Cars;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(CarAvailabilities::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(CarAvailabilities::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(CarAvailabilities::CarId).integer().not_null())
          .col(
            ColumnDef::new(CarAvailabilities::StartDate).date_time().not_null(),
          )
          .col(ColumnDef::new(CarAvailabilities::EndDate).date_time().not_null())
          .col(ColumnDef::new(CarAvailabilities::Reason).string().null())
          .col(
            ColumnDef::new(CarAvailabilities::CreatedAt).date_time().not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_car_availabilities_car")
              .from(CarAvailabilities::Table, CarAvailabilities::CarId)
              .to(Cars::Table, Cars::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_car_availabilities_car")
          .table(CarAvailabilities::Table)
          .col(CarAvailabilities::CarId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(CarAvailabilities::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum CarAvailabilities {
  Table,
  Id,
  CarId,
  StartDate,
  EndDate,
  Reason,
  CreatedAt,
}
