use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(CarCategories::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(CarCategories::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(CarCategories::Name).string().not_null().unique_key(),
          )
          .col(ColumnDef::new(CarCategories::Description).text().null())
          .col(
            ColumnDef::new(CarCategories::Tier).integer().not_null().default(1),
          )
          .col(ColumnDef::new(CarCategories::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(CarCategories::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum CarCategories {
  Table,
  Id,
  Name,
  Description,
  Tier,
  CreatedAt,
}
