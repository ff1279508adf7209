use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::booking::{self, BookingStatus};
use crate::entities::schedule::{self, ScheduleStatus};
use crate::entities::{booking_seat, route, user};
use crate::error::{AppError, AppResult};
use crate::services::schedule::{local_day_bounds, Catalog, RouteSummary};

const MAX_REPORT_DAYS: i64 = 366;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BookingCounts {
    pub pending: u64,
    pub paid: u64,
    pub cancelled: u64,
    pub completed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Overview {
    pub bookings: BookingCounts,
    pub revenue: i64,
    pub users: u64,
    pub active_routes: u64,
    pub upcoming_trips: u64,
}

fn earning_statuses() -> [BookingStatus; 2] {
    [BookingStatus::Paid, BookingStatus::Completed]
}

async fn count_status(db: &DatabaseConnection, status: BookingStatus) -> AppResult<u64> {
    Ok(booking::Entity::find()
        .filter(booking::Column::Status.eq(status))
        .count(db)
        .await?)
}

pub async fn overview(db: &DatabaseConnection, now: DateTime<Utc>) -> AppResult<Overview> {
    let bookings = BookingCounts {
        pending: count_status(db, BookingStatus::Pending).await?,
        paid: count_status(db, BookingStatus::Paid).await?,
        cancelled: count_status(db, BookingStatus::Cancelled).await?,
        completed: count_status(db, BookingStatus::Completed).await?,
    };

    let revenue = booking::Entity::find()
        .select_only()
        .column_as(revenue_expr(), "revenue")
        .filter(booking::Column::Status.is_in(earning_statuses()))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten();

    let now: sea_orm::prelude::DateTimeWithTimeZone = now.into();
    let upcoming_trips = schedule::Entity::find()
        .filter(schedule::Column::Status.eq(ScheduleStatus::Scheduled))
        .filter(schedule::Column::DepartureTime.gt(now))
        .count(db)
        .await?;

    Ok(Overview {
        bookings,
        revenue: revenue.unwrap_or(0),
        users: user::Entity::find().count(db).await?,
        active_routes: route::Entity::find()
            .filter(route::Column::IsActive.eq(true))
            .count(db)
            .await?,
        upcoming_trips,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub bookings: u64,
    pub revenue: i64,
}

/// SUM over BIGINT is NUMERIC on Postgres, so cast it back.
fn revenue_expr() -> SimpleExpr {
    Expr::cust("CAST(SUM(total_price) AS BIGINT)")
}

/// Local calendar day of `booked_at` as `YYYY-MM-DD` text.
fn local_day_expr(backend: DbBackend, offset: FixedOffset) -> SimpleExpr {
    let minutes = offset.local_minus_utc() / 60;
    match backend {
        DbBackend::Postgres => Expr::cust(format!(
            "to_char((booked_at AT TIME ZONE 'UTC') + interval '{} minutes', 'YYYY-MM-DD')",
            minutes
        )),
        DbBackend::MySql => Expr::cust(format!(
            "DATE_FORMAT(booked_at + INTERVAL {} MINUTE, '%Y-%m-%d')",
            minutes
        )),
        DbBackend::Sqlite => Expr::cust(format!(
            "strftime('%Y-%m-%d', booked_at, '{:+} minutes')",
            minutes
        )),
    }
}

/// Paid and completed bookings per local day of `booked_at`, zero days
/// included.
pub async fn revenue_by_day(
    db: &DatabaseConnection,
    from: NaiveDate,
    to: NaiveDate,
    offset: FixedOffset,
) -> AppResult<Vec<DailyRevenue>> {
    if to < from {
        return Err(AppError::BadRequest(
            "End date must not be before start date".to_string(),
        ));
    }
    if (to - from).num_days() + 1 > MAX_REPORT_DAYS {
        return Err(AppError::BadRequest(format!(
            "Date range cannot exceed {} days",
            MAX_REPORT_DAYS
        )));
    }

    let (start, _) = local_day_bounds(from, offset)?;
    let (_, end) = local_day_bounds(to, offset)?;
    let start: sea_orm::prelude::DateTimeWithTimeZone = start.into();
    let end: sea_orm::prelude::DateTimeWithTimeZone = end.into();

    let day = local_day_expr(db.get_database_backend(), offset);
    let rows: Vec<(String, i64, i64)> = booking::Entity::find()
        .select_only()
        .column_as(day.clone(), "day")
        .column_as(Expr::col(booking::Column::Id).count(), "bookings")
        .column_as(revenue_expr(), "revenue")
        .filter(booking::Column::Status.is_in(earning_statuses()))
        .filter(booking::Column::BookedAt.gte(start))
        .filter(booking::Column::BookedAt.lt(end))
        .group_by(day)
        .into_tuple()
        .all(db)
        .await?;

    let mut days: BTreeMap<NaiveDate, (u64, i64)> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .map(|d| (d, (0, 0)))
        .collect();

    for (day, bookings, revenue) in rows {
        let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
            .map_err(|e| AppError::Internal(format!("Unexpected day bucket {}: {}", day, e)))?;
        if let Some(entry) = days.get_mut(&date) {
            *entry = (bookings.max(0) as u64, revenue);
        }
    }

    Ok(days
        .into_iter()
        .map(|(date, (bookings, revenue))| DailyRevenue {
            date,
            bookings,
            revenue,
        })
        .collect())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteRanking {
    pub route: RouteSummary,
    pub seats_sold: u64,
    pub revenue: i64,
}

/// Routes ranked by seats sold on paid and completed bookings.
pub async fn top_routes(db: &DatabaseConnection, limit: usize) -> AppResult<Vec<RouteRanking>> {
    let limit = limit.clamp(1, 50);

    let bookings = booking::Entity::find()
        .filter(booking::Column::Status.is_in(earning_statuses()))
        .all(db)
        .await?;
    if bookings.is_empty() {
        return Ok(Vec::new());
    }

    let mut seats_per_booking: HashMap<i32, u64> = HashMap::new();
    for bs in booking_seat::Entity::find()
        .filter(booking_seat::Column::BookingId.is_in(bookings.iter().map(|b| b.id).collect::<Vec<_>>()))
        .all(db)
        .await?
    {
        *seats_per_booking.entry(bs.booking_id).or_default() += 1;
    }

    let route_of: HashMap<i32, i32> = schedule::Entity::find()
        .filter(schedule::Column::Id.is_in(bookings.iter().map(|b| b.schedule_id).collect::<Vec<_>>()))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s.route_id))
        .collect();

    let mut totals: HashMap<i32, (u64, i64)> = HashMap::new();
    for b in &bookings {
        let Some(route_id) = route_of.get(&b.schedule_id) else {
            continue;
        };
        let entry = totals.entry(*route_id).or_default();
        entry.0 += seats_per_booking.get(&b.id).copied().unwrap_or(0);
        entry.1 += b.total_price;
    }

    let mut ranked: Vec<(i32, u64, i64)> = totals
        .into_iter()
        .map(|(id, (seats, revenue))| (id, seats, revenue))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);

    let routes: HashMap<i32, route::Model> = route::Entity::find()
        .filter(route::Column::Id.is_in(ranked.iter().map(|r| r.0).collect::<Vec<_>>()))
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let catalog = Catalog::load(db).await?;
    let mut result = Vec::with_capacity(ranked.len());
    for (id, seats_sold, revenue) in ranked {
        if let Some(r) = routes.get(&id) {
            result.push(RouteRanking {
                route: catalog.route_summary(r)?,
                seats_sold,
                revenue,
            });
        }
    }
    Ok(result)
}
