use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Province::Table)
                    .if_not_exists()
                    .col(pk_auto(Province::Id))
                    .col(string_len(Province::Name, 100).not_null())
                    .col(string_len(Province::Code, 10).not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        // Seed provinces
        let insert = Query::insert()
            .into_table(Province::Table)
            .columns([Province::Name, Province::Code])
            .values_panic(["Hà Nội".into(), "HN".into()])
            .values_panic(["Hải Phòng".into(), "HP".into()])
            .values_panic(["Đà Nẵng".into(), "DN".into()])
            .values_panic(["Lâm Đồng".into(), "LD".into()])
            .values_panic(["Khánh Hòa".into(), "KH".into()])
            .values_panic(["TP. Hồ Chí Minh".into(), "HCM".into()])
            .values_panic(["Cần Thơ".into(), "CT".into()])
            .to_owned();

        manager.exec_stmt(insert).await?;

        manager
            .create_table(
                Table::create()
                    .table(Stop::Table)
                    .if_not_exists()
                    .col(pk_auto(Stop::Id))
                    .col(integer(Stop::ProvinceId).not_null())
                    .col(string_len(Stop::Name, 150).not_null())
                    .col(string_len(Stop::Address, 255).not_null())
                    .col(string_len(Stop::StopType, 20).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stop_province")
                            .from(Stop::Table, Stop::ProvinceId)
                            .to(Province::Table, Province::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Stop::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Province::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Province {
    Table,
    Id,
    Name,
    Code,
}

#[derive(DeriveIden)]
pub enum Stop {
    Table,
    Id,
    ProvinceId,
    Name,
    Address,
    StopType,
}
