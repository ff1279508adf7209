use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entities::booking::{self, BookingStatus, PaymentStatus};
use crate::entities::schedule::{self, ScheduleStatus};
use crate::entities::stop::{self, StopType};
use crate::entities::{booking_seat, seat, user};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::response::{Page, Pagination};
use crate::services::schedule::{load_trip, TripSummary};

pub const MAX_SEATS_PER_BOOKING: usize = 10;
pub const DEFAULT_PAYMENT_METHOD: &str = "payos";

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub schedule_id: i32,
    pub seat_ids: Vec<i32>,
    pub payment_method: Option<String>,
    pub pickup_stop_id: Option<i32>,
    pub dropoff_stop_id: Option<i32>,
    /// Client-computed total, stored as given when present.
    pub total_price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingUser {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopSummary {
    pub id: i32,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookedSeat {
    pub seat_id: i32,
    pub seat_number: String,
    pub floor: String,
    pub price: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingDetail {
    pub id: i32,
    pub status: BookingStatus,
    pub total_price: i64,
    pub payment_method: String,
    pub payment_status: Option<PaymentStatus>,
    pub order_code: Option<i64>,
    pub checkout_url: Option<String>,
    pub cancel_reason: Option<String>,
    pub booked_at: DateTime<Utc>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub user: BookingUser,
    pub trip: TripSummary,
    pub pickup_stop: Option<StopSummary>,
    pub dropoff_stop: Option<StopSummary>,
    /// Empty once the booking is cancelled and its seats are released.
    pub seats: Vec<BookedSeat>,
}

pub fn validate_seat_selection(seat_ids: &[i32]) -> AppResult<()> {
    if seat_ids.is_empty() {
        return Err(AppError::BadRequest(
            "At least one seat must be selected".to_string(),
        ));
    }
    if seat_ids.len() > MAX_SEATS_PER_BOOKING {
        return Err(AppError::BadRequest(format!(
            "At most {} seats can be booked at once",
            MAX_SEATS_PER_BOOKING
        )));
    }
    let unique: HashSet<&i32> = seat_ids.iter().collect();
    if unique.len() != seat_ids.len() {
        return Err(AppError::BadRequest(
            "Duplicate seats in selection".to_string(),
        ));
    }
    Ok(())
}

/// Schedule price times seat count, unless the client sent its own total.
pub fn booking_total(unit_price: i64, seat_count: usize, requested: Option<i64>) -> AppResult<i64> {
    match requested {
        Some(total) if total < 0 => Err(AppError::BadRequest(
            "Total price cannot be negative".to_string(),
        )),
        Some(total) => Ok(total),
        None => Ok(unit_price * seat_count as i64),
    }
}

fn seat_list(numbers: &[&str]) -> String {
    numbers.join(", ")
}

fn ensure_cancellable(b: &booking::Model) -> AppResult<()> {
    match b.status {
        BookingStatus::Cancelled => Err(AppError::Conflict(
            "Booking is already cancelled".to_string(),
        )),
        BookingStatus::Completed => Err(AppError::Conflict(
            "Completed bookings cannot be cancelled".to_string(),
        )),
        _ => Ok(()),
    }
}

async fn validate_stop<C: ConnectionTrait>(
    conn: &C,
    stop_id: Option<i32>,
    expected: StopType,
) -> AppResult<()> {
    let Some(id) = stop_id else {
        return Ok(());
    };

    let s = stop::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Stop not found".to_string()))?;

    if s.stop_type != expected {
        let label = match expected {
            StopType::Pickup => "pickup",
            StopType::Dropoff => "dropoff",
        };
        return Err(AppError::BadRequest(format!(
            "Stop {} is not a {} point",
            s.name, label
        )));
    }
    Ok(())
}

/// Seats among `seat_ids` that already belong to a non-cancelled booking.
async fn held_seat_ids<C: ConnectionTrait>(conn: &C, seat_ids: &[i32]) -> AppResult<HashSet<i32>> {
    let holders = booking_seat::Entity::find()
        .filter(booking_seat::Column::SeatId.is_in(seat_ids.to_vec()))
        .find_also_related(booking::Entity)
        .all(conn)
        .await?;

    Ok(holders
        .into_iter()
        .filter(|(_, b)| {
            b.as_ref()
                .map(|b| b.status != BookingStatus::Cancelled)
                .unwrap_or(false)
        })
        .map(|(bs, _)| bs.seat_id)
        .collect())
}

/// Create a pending booking holding the requested seats.
pub async fn create_booking(
    db: &DatabaseConnection,
    user_id: i32,
    request: NewBooking,
) -> AppResult<BookingDetail> {
    validate_seat_selection(&request.seat_ids)?;
    let now = Utc::now();

    let txn = db.begin().await?;

    user::Entity::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let trip = schedule::Entity::find_by_id(request.schedule_id)
        .one(&txn)
        .await?
        .filter(|s| s.status == ScheduleStatus::Scheduled && s.departure_time > now)
        .ok_or_else(|| AppError::NotFound("Schedule not found or not available".to_string()))?;

    let seats = seat::Entity::find()
        .filter(seat::Column::Id.is_in(request.seat_ids.clone()))
        .filter(seat::Column::ScheduleId.eq(trip.id))
        .filter(seat::Column::Enabled.eq(true))
        .lock_shared()
        .all(&txn)
        .await?;

    if seats.len() != request.seat_ids.len() {
        let found: HashSet<i32> = seats.iter().map(|s| s.id).collect();
        let invalid: Vec<String> = request
            .seat_ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();
        return Err(AppError::BadRequest(format!(
            "Invalid seats for this schedule: {}",
            invalid.join(", ")
        )));
    }

    validate_stop(&txn, request.pickup_stop_id, StopType::Pickup).await?;
    validate_stop(&txn, request.dropoff_stop_id, StopType::Dropoff).await?;

    let numbers: HashMap<i32, &str> = seats.iter().map(|s| (s.id, s.seat_number.as_str())).collect();

    let held = held_seat_ids(&txn, &request.seat_ids).await?;
    if !held.is_empty() {
        let mut taken: Vec<&str> = held.iter().filter_map(|id| numbers.get(id).copied()).collect();
        taken.sort_unstable();
        return Err(AppError::Conflict(format!(
            "Seats {} are already booked",
            seat_list(&taken)
        )));
    }

    let total_price = booking_total(trip.price, seats.len(), request.total_price)?;

    let created = booking::ActiveModel {
        user_id: Set(user_id),
        schedule_id: Set(trip.id),
        total_price: Set(total_price),
        status: Set(BookingStatus::Pending),
        payment_method: Set(request
            .payment_method
            .clone()
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string())),
        pickup_stop_id: Set(request.pickup_stop_id),
        dropoff_stop_id: Set(request.dropoff_stop_id),
        booked_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for s in &seats {
        booking_seat::ActiveModel {
            booking_id: Set(created.id),
            seat_id: Set(s.id),
            price: Set(trip.price),
            pickup_stop_id: Set(request.pickup_stop_id),
            dropoff_stop_id: Set(request.dropoff_stop_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| seat_claim_error(e, &s.seat_number))?;
    }

    txn.commit().await?;

    tracing::info!(
        booking_id = created.id,
        user_id,
        schedule_id = trip.id,
        seats = seats.len(),
        total_price,
        "Booking created"
    );

    load_detail(db, created).await
}

/// A concurrent booking grabbed the seat between the check and the insert.
fn seat_claim_error(err: DbErr, seat_number: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(format!("Seats {} are already booked", seat_number))
    } else {
        AppError::Database(err)
    }
}

pub(crate) async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    b: booking::Model,
) -> AppResult<BookingDetail> {
    let owner = user::Entity::find_by_id(b.user_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let trip = schedule::Entity::find_by_id(b.schedule_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

    let mut seats: Vec<BookedSeat> = booking_seat::Entity::find()
        .filter(booking_seat::Column::BookingId.eq(b.id))
        .find_also_related(seat::Entity)
        .all(conn)
        .await?
        .into_iter()
        .filter_map(|(bs, s)| {
            s.map(|s| BookedSeat {
                seat_id: s.id,
                seat_number: s.seat_number,
                floor: s.floor,
                price: bs.price,
            })
        })
        .collect();
    seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));

    let pickup_stop = stop_summary(conn, b.pickup_stop_id).await?;
    let dropoff_stop = stop_summary(conn, b.dropoff_stop_id).await?;

    Ok(BookingDetail {
        id: b.id,
        status: b.status,
        total_price: b.total_price,
        payment_method: b.payment_method,
        payment_status: b.payment_status,
        order_code: b.order_code,
        checkout_url: b.checkout_url,
        cancel_reason: b.cancel_reason,
        booked_at: b.booked_at.with_timezone(&Utc),
        payment_completed_at: b.payment_completed_at.map(|t| t.with_timezone(&Utc)),
        user: BookingUser {
            id: owner.id,
            full_name: owner.full_name,
            email: owner.email,
            phone: owner.phone,
        },
        trip: load_trip(conn, &trip).await?,
        pickup_stop,
        dropoff_stop,
        seats,
    })
}

async fn stop_summary<C: ConnectionTrait>(
    conn: &C,
    stop_id: Option<i32>,
) -> AppResult<Option<StopSummary>> {
    let Some(id) = stop_id else {
        return Ok(None);
    };
    Ok(stop::Entity::find_by_id(id)
        .one(conn)
        .await?
        .map(|s| StopSummary {
            id: s.id,
            name: s.name,
            address: s.address,
        }))
}

/// Fetch a booking; `owner` restricts access to that user's bookings.
pub async fn get_booking(
    db: &DatabaseConnection,
    booking_id: i32,
    owner: Option<i32>,
) -> AppResult<BookingDetail> {
    let b = find_booking(db, booking_id).await?;
    if let Some(user_id) = owner {
        if b.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only view your own bookings".to_string(),
            ));
        }
    }
    load_detail(db, b).await
}

pub async fn list_user_bookings(db: &DatabaseConnection, user_id: i32) -> AppResult<Vec<BookingDetail>> {
    let bookings = booking::Entity::find()
        .filter(booking::Column::UserId.eq(user_id))
        .order_by_desc(booking::Column::BookedAt)
        .order_by_desc(booking::Column::Id)
        .all(db)
        .await?;

    let mut details = Vec::with_capacity(bookings.len());
    for b in bookings {
        details.push(load_detail(db, b).await?);
    }
    Ok(details)
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub schedule_id: Option<i32>,
    pub user_id: Option<i32>,
}

pub async fn list_bookings(
    db: &DatabaseConnection,
    filter: BookingFilter,
    pagination: Pagination,
) -> AppResult<Page<booking::Model>> {
    let (page, per_page, offset) = pagination.normalize();

    let mut finder = booking::Entity::find();
    if let Some(status) = filter.status {
        finder = finder.filter(booking::Column::Status.eq(status));
    }
    if let Some(schedule_id) = filter.schedule_id {
        finder = finder.filter(booking::Column::ScheduleId.eq(schedule_id));
    }
    if let Some(user_id) = filter.user_id {
        finder = finder.filter(booking::Column::UserId.eq(user_id));
    }
    let finder = finder.order_by_desc(booking::Column::BookedAt);

    let total = finder.clone().count(db).await?;
    let items = finder.limit(per_page).offset(offset).all(db).await?;

    Ok(Page {
        items,
        page,
        per_page,
        total,
    })
}

pub(crate) async fn find_booking<C: ConnectionTrait>(conn: &C, booking_id: i32) -> AppResult<booking::Model> {
    booking::Entity::find_by_id(booking_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

/// Move a booking out of `from`, applying `changes`. Returns false when the
/// row is no longer in `from`, i.e. someone else already moved it.
pub(crate) async fn transition<C: ConnectionTrait>(
    conn: &C,
    booking_id: i32,
    from: BookingStatus,
    changes: booking::ActiveModel,
) -> AppResult<bool> {
    let result = booking::Entity::update_many()
        .set(changes)
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(from))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Cancel `b` and free its seats. Shared by customer, admin, payment and
/// expiry paths; the caller owns the transaction.
pub(crate) async fn release_booking<C: ConnectionTrait>(
    conn: &C,
    b: &booking::Model,
    reason: &str,
    payment_status: Option<PaymentStatus>,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    ensure_cancellable(b)?;

    let mut changes = booking::ActiveModel {
        status: Set(BookingStatus::Cancelled),
        cancel_reason: Set(Some(reason.to_string())),
        updated_at: Set(now.into()),
        ..Default::default()
    };
    if let Some(status) = payment_status {
        changes.payment_status = Set(Some(status));
    }

    if !transition(conn, b.id, b.status, changes).await? {
        return Ok(false);
    }

    booking_seat::Entity::delete_many()
        .filter(booking_seat::Column::BookingId.eq(b.id))
        .exec(conn)
        .await?;

    Ok(true)
}

fn concurrent_change() -> AppError {
    AppError::Conflict("Booking was modified concurrently, please retry".to_string())
}

pub async fn cancel_booking(
    db: &DatabaseConnection,
    user_id: i32,
    booking_id: i32,
) -> AppResult<BookingDetail> {
    let now = Utc::now();
    let txn = db.begin().await?;

    let b = find_booking(&txn, booking_id).await?;
    if b.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only cancel your own bookings".to_string(),
        ));
    }
    ensure_cancellable(&b)?;

    let trip = schedule::Entity::find_by_id(b.schedule_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;
    if trip.departure_time <= now {
        return Err(AppError::BadRequest(
            "Cannot cancel a booking after departure".to_string(),
        ));
    }

    if !release_booking(&txn, &b, "Cancelled by customer", None, now).await? {
        return Err(concurrent_change());
    }
    txn.commit().await?;

    tracing::info!(booking_id, user_id, "Booking cancelled by customer");

    let b = find_booking(db, booking_id).await?;
    load_detail(db, b).await
}

pub async fn cancel_booking_by_admin(
    db: &DatabaseConnection,
    booking_id: i32,
    reason: Option<String>,
) -> AppResult<BookingDetail> {
    let now = Utc::now();
    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "Cancelled by admin".to_string());

    let txn = db.begin().await?;
    let b = find_booking(&txn, booking_id).await?;

    if !release_booking(&txn, &b, &reason, None, now).await? {
        return Err(concurrent_change());
    }
    txn.commit().await?;

    tracing::info!(booking_id, reason = %reason, "Booking cancelled by admin");

    let b = find_booking(db, booking_id).await?;
    load_detail(db, b).await
}

pub async fn complete_booking(db: &DatabaseConnection, booking_id: i32) -> AppResult<BookingDetail> {
    let b = find_booking(db, booking_id).await?;
    if b.status != BookingStatus::Paid {
        return Err(AppError::Conflict(
            "Only paid bookings can be completed".to_string(),
        ));
    }

    let changes = booking::ActiveModel {
        status: Set(BookingStatus::Completed),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };
    if !transition(db, booking_id, BookingStatus::Paid, changes).await? {
        return Err(concurrent_change());
    }

    tracing::info!(booking_id, "Booking completed");

    let b = find_booking(db, booking_id).await?;
    load_detail(db, b).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_selection_limits() {
        assert!(validate_seat_selection(&[1]).is_ok());
        assert!(matches!(validate_seat_selection(&[]), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_seat_selection(&[3, 3]), Err(AppError::BadRequest(_))));

        let too_many: Vec<i32> = (1..=11).collect();
        assert!(matches!(validate_seat_selection(&too_many), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_total_uses_schedule_price() {
        assert_eq!(booking_total(250_000, 2, None).unwrap(), 500_000);
    }

    #[test]
    fn test_total_keeps_client_override() {
        assert_eq!(booking_total(250_000, 2, Some(450_000)).unwrap(), 450_000);
        assert_eq!(booking_total(250_000, 2, Some(0)).unwrap(), 0);
        assert!(booking_total(250_000, 2, Some(-1)).is_err());
    }
}
