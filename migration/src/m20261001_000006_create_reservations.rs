use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;
use super::m20261001_000003_create_cars::Cars;
use super::m20261001_000005_create_reservation_statuses::ReservationStatuses;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Reservations::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Reservations::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Reservations::UserId).integer().not_null())
          .col(ColumnDef::new(Reservations::CarId).integer().not_null())
          .col(
            ColumnDef::new(Reservations::StatusId)
              .integer()
              .not_null()
              .default(1),
          )
          .col(ColumnDef::new(Reservations::StartDate).date_time().not_null())
          .col(ColumnDef::new(Reservations::EndDate).date_time().not_null())
          .col(ColumnDef::new(Reservations::PickupLocation).text().not_null())
          .col(ColumnDef::new(Reservations::ReturnLocation).text().not_null())
          .col(ColumnDef::new(Reservations::AddOns).json().null())
          .col(
            ColumnDef::new(Reservations::TotalPriceCents)
              .big_integer()
              .not_null(),
          )
          .col(ColumnDef::new(Reservations::DepositCents).big_integer().not_null())
          .col(
            ColumnDef::new(Reservations::DepositPaid)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(Reservations::InitialMileage).integer().null())
          .col(ColumnDef::new(Reservations::FinalMileage).integer().null())
          .col(ColumnDef::new(Reservations::KmDriven).integer().null())
          .col(ColumnDef::new(Reservations::ExtraKm).integer().null())
          .col(ColumnDef::new(Reservations::ExtraFeesCents).big_integer().null())
          .col(ColumnDef::new(Reservations::ActualStartDate).date_time().null())
          .col(ColumnDef::new(Reservations::ActualEndDate).date_time().null())
          .col(ColumnDef::new(Reservations::SpecialRequests).text().null())
          .col(ColumnDef::new(Reservations::CancelledAt).date_time().null())
          .col(ColumnDef::new(Reservations::CancelReason).text().null())
          .col(
            ColumnDef::new(Reservations::Version).integer().not_null().default(0),
          )
          .col(ColumnDef::new(Reservations::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Reservations::UpdatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_reservations_user")
              .from(Reservations::Table, Reservations::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_reservations_car")
              .from(Reservations::Table, Reservations::CarId)
              .to(Cars::Table, Cars::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_reservations_status")
              .from(Reservations::Table, Reservations::StatusId)
              .to(ReservationStatuses::Table, ReservationStatuses::Id),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_reservations_car_status")
          .table(Reservations::Table)
          .col(Reservations::CarId)
          .col(Reservations::StatusId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_reservations_user")
          .table(Reservations::Table)
          .col(Reservations::UserId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Reservations::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Reservations {
  Table,
  Id,
  UserId,
  CarId,
  StatusId,
  StartDate,
  EndDate,
  PickupLocation,
  ReturnLocation,
  AddOns,
  TotalPriceCents,
  DepositCents,
  DepositPaid,
  InitialMileage,
  FinalMileage,
  KmDriven,
  ExtraKm,
  ExtraFeesCents,
  ActualStartDate,
  ActualEndDate,
  SpecialRequests,
  CancelledAt,
  CancelReason,
  Version,
  CreatedAt,
  UpdatedAt,
}
