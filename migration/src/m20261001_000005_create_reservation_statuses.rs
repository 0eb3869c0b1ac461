use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Fixed status set. Ids are referenced by `reservations.status_id` and must
/// match the entity enum.
const STATUSES: [(i32, &str, &str); 6] = [
  (1, "pending", "Awaiting confirmation"),
  (2, "confirmed", "Confirmed by staff"),
  (3, "cancelled", "Cancelled"),
  (4, "in_progress", "Rental in progress"),
  (5, "completed", "Rental completed"),
  (6, "refunded", "Refunded"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(ReservationStatuses::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(ReservationStatuses::Id)
              .integer()
              .not_null()
              .primary_key(),
          )
          .col(
            ColumnDef::new(ReservationStatuses::Name)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(ReservationStatuses::Description).text().null())
          .to_owned(),
      )
      .await?;

    let mut insert = Query::insert();
    insert.into_table(ReservationStatuses::Table).columns([
      ReservationStatuses::Id,
      ReservationStatuses::Name,
      ReservationStatuses::Description,
    ]);
    for (id, name, description) in STATUSES {
      insert.values_panic([id.into(), name.into(), description.into()]);
    }
    manager.exec_stmt(insert).await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ReservationStatuses::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum ReservationStatuses {
  Table,
  Id,
  Name,
  Description,
}
