use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_provinces_and_stops::Stop;
use super::m20250301_000002_create_accounts::User;
use super::m20250301_000005_create_schedules::{Schedule, Seat};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Booking::Table)
                    .if_not_exists()
                    .col(pk_auto(Booking::Id))
                    .col(integer(Booking::UserId).not_null())
                    .col(integer(Booking::ScheduleId).not_null())
                    .col(big_integer(Booking::TotalPrice).not_null())
                    .col(string_len(Booking::Status, 20).not_null())
                    .col(string_len(Booking::PaymentMethod, 30).not_null())
                    .col(integer_null(Booking::PickupStopId))
                    .col(integer_null(Booking::DropoffStopId))
                    .col(string_len_null(Booking::PaymentRequestId, 100))
                    .col(text_null(Booking::CheckoutUrl))
                    .col(big_integer_null(Booking::OrderCode).unique_key())
                    .col(string_len_null(Booking::PaymentStatus, 20))
                    .col(timestamp_with_time_zone_null(Booking::PaymentCompletedAt))
                    .col(string_len_null(Booking::CancelReason, 255))
                    .col(timestamp_with_time_zone(Booking::BookedAt).not_null())
                    .col(timestamp_with_time_zone(Booking::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_user")
                            .from(Booking::Table, Booking::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_schedule")
                            .from(Booking::Table, Booking::ScheduleId)
                            .to(Schedule::Table, Schedule::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_pickup_stop")
                            .from(Booking::Table, Booking::PickupStopId)
                            .to(Stop::Table, Stop::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_dropoff_stop")
                            .from(Booking::Table, Booking::DropoffStopId)
                            .to(Stop::Table, Stop::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Serves the expiry scan over pending bookings
        manager
            .create_index(
                Index::create()
                    .name("idx_booking_status_booked_at")
                    .table(Booking::Table)
                    .col(Booking::Status)
                    .col(Booking::BookedAt)
                    .to_owned(),
            )
            .await?;

        // A seat row only exists while its booking is not cancelled, so a
        // unique seat id means one active holder per seat.
        manager
            .create_table(
                Table::create()
                    .table(BookingSeat::Table)
                    .if_not_exists()
                    .col(pk_auto(BookingSeat::Id))
                    .col(integer(BookingSeat::BookingId).not_null())
                    .col(integer(BookingSeat::SeatId).not_null().unique_key())
                    .col(big_integer(BookingSeat::Price).not_null())
                    .col(integer_null(BookingSeat::PickupStopId))
                    .col(integer_null(BookingSeat::DropoffStopId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_seat_booking")
                            .from(BookingSeat::Table, BookingSeat::BookingId)
                            .to(Booking::Table, Booking::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_seat_seat")
                            .from(BookingSeat::Table, BookingSeat::SeatId)
                            .to(Seat::Table, Seat::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Feedback::Table)
                    .if_not_exists()
                    .col(pk_auto(Feedback::Id))
                    .col(integer(Feedback::UserId).not_null())
                    .col(integer(Feedback::BookingId).not_null().unique_key())
                    .col(integer(Feedback::Rating).not_null())
                    .col(text_null(Feedback::Comment))
                    .col(timestamp_with_time_zone(Feedback::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_feedback_user")
                            .from(Feedback::Table, Feedback::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_feedback_booking")
                            .from(Feedback::Table, Feedback::BookingId)
                            .to(Booking::Table, Booking::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Feedback::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BookingSeat::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Booking::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Booking {
    Table,
    Id,
    UserId,
    ScheduleId,
    TotalPrice,
    Status,
    PaymentMethod,
    PickupStopId,
    DropoffStopId,
    PaymentRequestId,
    CheckoutUrl,
    OrderCode,
    PaymentStatus,
    PaymentCompletedAt,
    CancelReason,
    BookedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum BookingSeat {
    Table,
    Id,
    BookingId,
    SeatId,
    Price,
    PickupStopId,
    DropoffStopId,
}

#[derive(DeriveIden)]
pub enum Feedback {
    Table,
    Id,
    UserId,
    BookingId,
    Rating,
    Comment,
    CreatedAt,
}
