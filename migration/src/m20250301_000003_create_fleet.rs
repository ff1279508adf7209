use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BusType::Table)
                    .if_not_exists()
                    .col(pk_auto(BusType::Id))
                    .col(string_len(BusType::Name, 100).not_null().unique_key())
                    .col(text_null(BusType::Description))
                    .col(integer(BusType::Floors).not_null().default(1))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Bus::Table)
                    .if_not_exists()
                    .col(pk_auto(Bus::Id))
                    .col(string_len(Bus::LicensePlate, 20).not_null().unique_key())
                    .col(integer(Bus::SeatCount).not_null())
                    .col(integer(Bus::BusTypeId).not_null())
                    .col(boolean(Bus::IsActive).not_null().default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bus_bus_type")
                            .from(Bus::Table, Bus::BusTypeId)
                            .to(BusType::Table, BusType::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Driver::Table)
                    .if_not_exists()
                    .col(pk_auto(Driver::Id))
                    .col(string_len(Driver::FullName, 100).not_null())
                    .col(string_len(Driver::Phone, 20).not_null())
                    .col(string_len(Driver::LicenseNumber, 30).not_null().unique_key())
                    .col(boolean(Driver::IsActive).not_null().default(true))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Driver::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Bus::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BusType::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum BusType {
    Table,
    Id,
    Name,
    Description,
    Floors,
}

#[derive(DeriveIden)]
pub enum Bus {
    Table,
    Id,
    LicensePlate,
    SeatCount,
    BusTypeId,
    IsActive,
}

#[derive(DeriveIden)]
pub enum Driver {
    Table,
    Id,
    FullName,
    Phone,
    LicenseNumber,
    IsActive,
}
