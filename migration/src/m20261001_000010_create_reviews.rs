use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;
use super::m20261001_000003_create_cars::Cars;
use super::m20261001_000006_create_reservations::Reservations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Reviews::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Reviews::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(Reviews::ReservationId)
              .integer()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(Reviews::UserId).integer().not_null())
          .col(ColumnDef::new(Reviews::CarId).integer().not_null())
          .col(ColumnDef::new(Reviews::Rating).integer().not_null())
          .col(ColumnDef::new(Reviews::Comment).text().null())
          .col(ColumnDef::new(Reviews::CreatedAt).date_time().not_null())
          .check(Expr::col(Reviews::Rating).between(1, 5))
          .foreign_key(
            ForeignKey::create()
              .name("fk_reviews_reservation")
              .from(Reviews::Table, Reviews::ReservationId)
              .to(Reservations::Table, Reservations::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_reviews_user")
              .from(Reviews::Table, Reviews::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_reviews_car")
              .from(Reviews::Table, Reviews::CarId)
              .to(Cars::Table, Cars::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Reviews::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Reviews {
  Table,
  Id,
  ReservationId,
  UserId,
  CarId,
  Rating,
  Comment,
  CreatedAt,
}
