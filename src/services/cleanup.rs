use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entities::booking::{self, BookingStatus, PaymentStatus};
use crate::error::AppResult;
use crate::services::booking::release_booking;

pub const EXPIRED_REASON: &str = "Payment timeout";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ReclaimReport {
    pub scanned: usize,
    pub cancelled: usize,
    /// Already moved by a payment, a user or another cleanup run.
    pub skipped: usize,
    pub failed: usize,
}

/// Cancel every pending booking older than `timeout` and free its seats.
///
/// Each booking is handled in its own transaction so one failure does not
/// stop the batch. Safe to run concurrently: the status change is
/// conditional on the booking still being pending.
pub async fn reclaim_expired(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    timeout: Duration,
) -> AppResult<ReclaimReport> {
    let cutoff: sea_orm::prelude::DateTimeWithTimeZone = (now - timeout).into();

    let expired = booking::Entity::find()
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .filter(booking::Column::BookedAt.lte(cutoff))
        .order_by_asc(booking::Column::BookedAt)
        .all(db)
        .await?;

    let mut report = ReclaimReport {
        scanned: expired.len(),
        ..Default::default()
    };

    for b in &expired {
        match expire_one(db, b, now).await {
            Ok(true) => {
                report.cancelled += 1;
                tracing::info!(
                    booking_id = b.id,
                    user_id = b.user_id,
                    schedule_id = b.schedule_id,
                    "Expired booking cancelled"
                );
            }
            Ok(false) => {
                report.skipped += 1;
                tracing::debug!(booking_id = b.id, "Booking no longer pending, skipped");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(booking_id = b.id, error = %e, "Failed to cancel expired booking");
            }
        }
    }

    if report.scanned > 0 {
        tracing::info!(
            scanned = report.scanned,
            cancelled = report.cancelled,
            skipped = report.skipped,
            failed = report.failed,
            "Expired booking cleanup finished"
        );
    }

    Ok(report)
}

async fn expire_one(
    db: &DatabaseConnection,
    b: &booking::Model,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let txn = db.begin().await?;
    // only bookings that reached the provider get an expired payment status
    let payment_status = b.payment_status.map(|_| PaymentStatus::Expired);
    let released = release_booking(&txn, b, EXPIRED_REASON, payment_status, now).await?;
    txn.commit().await?;
    Ok(released)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSummary {
    pub total_pending: usize,
    pub near_expiry: usize,
    pub expired: usize,
    pub timeout_minutes: i64,
    pub warning_minutes: i64,
}

pub fn summarize_ages(
    booked_at: &[DateTime<Utc>],
    now: DateTime<Utc>,
    warning: Duration,
    timeout: Duration,
) -> PendingSummary {
    let mut summary = PendingSummary {
        total_pending: booked_at.len(),
        near_expiry: 0,
        expired: 0,
        timeout_minutes: timeout.num_minutes(),
        warning_minutes: warning.num_minutes(),
    };

    for at in booked_at {
        let age = now - *at;
        if age >= timeout {
            summary.expired += 1;
        } else if age >= warning {
            summary.near_expiry += 1;
        }
    }
    summary
}

/// Read-only view of pending bookings for the admin dashboard.
pub async fn pending_summary(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    warning: Duration,
    timeout: Duration,
) -> AppResult<PendingSummary> {
    let booked_at: Vec<DateTime<Utc>> = booking::Entity::find()
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .all(db)
        .await?
        .into_iter()
        .map(|b| b.booked_at.with_timezone(&Utc))
        .collect();

    Ok(summarize_ages(&booked_at, now, warning, timeout))
}
