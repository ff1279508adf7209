use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entities::booking::{self, BookingStatus};
use crate::entities::{booking_seat, schedule, seat};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Available,
    Pending,
    Booked,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatView {
    pub id: i32,
    pub seat_number: String,
    pub status: SeatState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorSeats {
    pub floor: String,
    pub seats: Vec<SeatView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMap {
    pub schedule_id: i32,
    pub total: usize,
    pub available: usize,
    pub floors: Vec<FloorSeats>,
}

/// Derive what the client should show for one seat.
pub fn seat_view(
    s: &seat::Model,
    holder: Option<&booking::Model>,
    now: DateTime<Utc>,
    timeout: Duration,
) -> SeatView {
    let mut view = SeatView {
        id: s.id,
        seat_number: s.seat_number.clone(),
        status: SeatState::Available,
        elapsed_seconds: None,
        remaining_seconds: None,
    };

    match holder.map(|b| (b.status, b.booked_at.with_timezone(&Utc))) {
        Some((BookingStatus::Paid | BookingStatus::Completed, _)) => {
            view.status = SeatState::Booked;
        }
        Some((BookingStatus::Pending, booked_at)) => {
            let elapsed = (now - booked_at).num_seconds().max(0);
            view.status = SeatState::Pending;
            view.elapsed_seconds = Some(elapsed);
            view.remaining_seconds = Some((timeout.num_seconds() - elapsed).max(0));
        }
        _ if !s.enabled => view.status = SeatState::Blocked,
        _ => {}
    }
    view
}

/// Seat map of a schedule, grouped by floor in label order.
pub async fn seat_map(
    db: &DatabaseConnection,
    schedule_id: i32,
    now: DateTime<Utc>,
    timeout: Duration,
) -> AppResult<SeatMap> {
    schedule::Entity::find_by_id(schedule_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

    let seats = seat::Entity::find()
        .filter(seat::Column::ScheduleId.eq(schedule_id))
        .order_by_asc(seat::Column::Floor)
        .order_by_asc(seat::Column::SeatNumber)
        .all(db)
        .await?;

    let holders: HashMap<i32, booking::Model> = booking_seat::Entity::find()
        .filter(booking_seat::Column::SeatId.is_in(seats.iter().map(|s| s.id).collect::<Vec<_>>()))
        .find_also_related(booking::Entity)
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(bs, b)| b.filter(|b| b.status != BookingStatus::Cancelled).map(|b| (bs.seat_id, b)))
        .collect();

    let mut floors: Vec<FloorSeats> = Vec::new();
    for s in &seats {
        let view = seat_view(s, holders.get(&s.id), now, timeout);
        match floors.last_mut() {
            Some(f) if f.floor == s.floor => f.seats.push(view),
            _ => floors.push(FloorSeats {
                floor: s.floor.clone(),
                seats: vec![view],
            }),
        }
    }

    let available = floors
        .iter()
        .flat_map(|f| f.seats.iter())
        .filter(|v| v.status == SeatState::Available)
        .count();

    Ok(SeatMap {
        schedule_id,
        total: seats.len(),
        available,
        floors,
    })
}

/// Enable or disable a seat. The seat row stays locked until commit so a
/// booking cannot claim it between the holder check and the update.
pub async fn set_seat_enabled(
    db: &DatabaseConnection,
    seat_id: i32,
    enabled: bool,
) -> AppResult<seat::Model> {
    let txn = db.begin().await?;

    let existing = seat::Entity::find_by_id(seat_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Seat not found".to_string()))?;

    if !enabled {
        let held = booking_seat::Entity::find()
            .filter(booking_seat::Column::SeatId.eq(seat_id))
            .count(&txn)
            .await?;
        if held > 0 {
            return Err(AppError::Conflict(
                "Seat is held by an active booking".to_string(),
            ));
        }
    }

    let mut active: seat::ActiveModel = existing.into();
    active.enabled = Set(enabled);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(seat_id, enabled, "Seat availability changed");
    Ok(updated)
}
