use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000003_create_fleet::{Bus, Driver};
use super::m20250301_000004_create_routes::{Route, SchedulePattern};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Schedule::Table)
                    .if_not_exists()
                    .col(pk_auto(Schedule::Id))
                    .col(integer(Schedule::RouteId).not_null())
                    .col(integer(Schedule::BusId).not_null())
                    .col(integer_null(Schedule::DriverId))
                    .col(timestamp_with_time_zone(Schedule::DepartureTime).not_null())
                    .col(timestamp_with_time_zone(Schedule::ArrivalTime).not_null())
                    .col(big_integer(Schedule::Price).not_null())
                    .col(string_len(Schedule::Status, 20).not_null())
                    .col(integer_null(Schedule::PatternId))
                    .col(boolean(Schedule::AutoGenerated).not_null().default(false))
                    .col(timestamp_with_time_zone(Schedule::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_route")
                            .from(Schedule::Table, Schedule::RouteId)
                            .to(Route::Table, Route::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_bus")
                            .from(Schedule::Table, Schedule::BusId)
                            .to(Bus::Table, Bus::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_driver")
                            .from(Schedule::Table, Schedule::DriverId)
                            .to(Driver::Table, Driver::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_pattern")
                            .from(Schedule::Table, Schedule::PatternId)
                            .to(SchedulePattern::Table, SchedulePattern::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schedule_departure_time")
                    .table(Schedule::Table)
                    .col(Schedule::DepartureTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Seat::Table)
                    .if_not_exists()
                    .col(pk_auto(Seat::Id))
                    .col(integer(Seat::ScheduleId).not_null())
                    .col(string_len(Seat::SeatNumber, 10).not_null())
                    .col(string_len(Seat::Floor, 10).not_null())
                    .col(boolean(Seat::Enabled).not_null().default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_seat_schedule")
                            .from(Seat::Table, Seat::ScheduleId)
                            .to(Schedule::Table, Schedule::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_seat_schedule_number")
                    .table(Seat::Table)
                    .col(Seat::ScheduleId)
                    .col(Seat::SeatNumber)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Seat::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Schedule::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Schedule {
    Table,
    Id,
    RouteId,
    BusId,
    DriverId,
    DepartureTime,
    ArrivalTime,
    Price,
    Status,
    PatternId,
    AutoGenerated,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum Seat {
    Table,
    Id,
    ScheduleId,
    SeatNumber,
    Floor,
    Enabled,
}
