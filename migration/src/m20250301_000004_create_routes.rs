use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_provinces_and_stops::Province;
use super::m20250301_000003_create_fleet::BusType;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Route::Table)
                    .if_not_exists()
                    .col(pk_auto(Route::Id))
                    .col(integer(Route::DepartureProvinceId).not_null())
                    .col(integer(Route::ArrivalProvinceId).not_null())
                    .col(double(Route::DistanceKm).not_null())
                    .col(integer(Route::EstimatedDurationMinutes).not_null())
                    .col(boolean(Route::IsActive).not_null().default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_route_departure_province")
                            .from(Route::Table, Route::DepartureProvinceId)
                            .to(Province::Table, Province::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_route_arrival_province")
                            .from(Route::Table, Route::ArrivalProvinceId)
                            .to(Province::Table, Province::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SchedulePattern::Table)
                    .if_not_exists()
                    .col(pk_auto(SchedulePattern::Id))
                    .col(string_len(SchedulePattern::Name, 100).not_null().unique_key())
                    .col(integer(SchedulePattern::RouteId).not_null())
                    .col(integer(SchedulePattern::BusTypeId).not_null())
                    .col(text(SchedulePattern::DepartureTimes).not_null())
                    .col(text(SchedulePattern::DaysOfWeek).not_null())
                    .col(big_integer(SchedulePattern::BasePrice).not_null())
                    .col(boolean(SchedulePattern::IsActive).not_null().default(true))
                    .col(timestamp_with_time_zone(SchedulePattern::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_pattern_route")
                            .from(SchedulePattern::Table, SchedulePattern::RouteId)
                            .to(Route::Table, Route::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_pattern_bus_type")
                            .from(SchedulePattern::Table, SchedulePattern::BusTypeId)
                            .to(BusType::Table, BusType::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SchedulePattern::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Route::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Route {
    Table,
    Id,
    DepartureProvinceId,
    ArrivalProvinceId,
    DistanceKm,
    EstimatedDurationMinutes,
    IsActive,
}

#[derive(DeriveIden)]
pub enum SchedulePattern {
    Table,
    Id,
    Name,
    RouteId,
    BusTypeId,
    DepartureTimes,
    DaysOfWeek,
    BasePrice,
    IsActive,
    CreatedAt,
}
