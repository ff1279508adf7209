use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Deserialize;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::{feedback, schedule, seat, user};
use crate::error::{AppError, AppResult};
use crate::response::{ok, JsonResponse, Page, Pagination};
use crate::services::booking::{self as bookings, BookingDetail, BookingFilter};
use crate::services::cleanup::{self, PendingSummary, ReclaimReport};
use crate::services::seat as seats;
use crate::services::statistics::{self, DailyRevenue, Overview, RouteRanking};
use crate::AppState;

// ============ Booking Management ============

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub schedule_id: Option<i32>,
    pub user_id: Option<i32>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingListQuery>,
) -> AppResult<JsonResponse<Page<booking::Model>>> {
    let page = bookings::list_bookings(
        &state.db,
        BookingFilter {
            status: query.status,
            schedule_id: query.schedule_id,
            user_id: query.user_id,
        },
        Pagination {
            page: query.page,
            per_page: query.per_page,
        },
    )
    .await?;
    Ok(ok("Bookings retrieved", page))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Cancel any booking that is not cancelled or completed yet
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<CancelRequest>>,
) -> AppResult<JsonResponse<BookingDetail>> {
    let reason = payload.and_then(|Json(p)| p.reason);
    let detail = bookings::cancel_booking_by_admin(&state.db, id, reason).await?;
    Ok(ok("Booking cancelled", detail))
}

pub async fn complete_booking(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<BookingDetail>> {
    Ok(ok("Booking completed", bookings::complete_booking(&state.db, id).await?))
}

// ============ Seats ============

#[derive(Debug, Deserialize)]
pub struct SeatStatusRequest {
    pub enabled: bool,
}

pub async fn set_seat_enabled(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<SeatStatusRequest>,
) -> AppResult<JsonResponse<seat::Model>> {
    let updated = seats::set_seat_enabled(&state.db, id, payload.enabled).await?;
    Ok(ok("Seat updated", updated))
}

// ============ Users ============

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> AppResult<JsonResponse<Page<user::Model>>> {
    let (page, per_page, offset) = Pagination {
        page: query.page,
        per_page: query.per_page,
    }
    .normalize();

    let mut finder = user::Entity::find();
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        finder = finder.filter(
            user::Column::Email
                .contains(term)
                .or(user::Column::FullName.contains(term)),
        );
    }
    let finder = finder.order_by_desc(user::Column::CreatedAt);

    let total = finder.clone().count(&state.db).await?;
    let items = finder.limit(per_page).offset(offset).all(&state.db).await?;

    Ok(ok(
        "Users retrieved",
        Page {
            items,
            page,
            per_page,
            total,
        },
    ))
}

// ============ Feedback ============

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub route_id: Option<i32>,
}

pub async fn list_feedback(
    State(state): State<AppState>,
    Query(query): Query<FeedbackQuery>,
) -> AppResult<JsonResponse<Vec<feedback::Model>>> {
    let mut finder = feedback::Entity::find();

    if let Some(route_id) = query.route_id {
        let schedule_ids: Vec<i32> = schedule::Entity::find()
            .filter(schedule::Column::RouteId.eq(route_id))
            .all(&state.db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let booking_ids: Vec<i32> = booking::Entity::find()
            .filter(booking::Column::ScheduleId.is_in(schedule_ids))
            .all(&state.db)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        finder = finder.filter(feedback::Column::BookingId.is_in(booking_ids));
    }

    let list = finder
        .order_by_desc(feedback::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(ok("Feedback retrieved", list))
}

// ============ Statistics ============

pub async fn stats_overview(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<Overview>> {
    Ok(ok("Overview retrieved", statistics::overview(&state.db, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Daily revenue over local days, last 30 by default
pub async fn stats_revenue(
    State(state): State<AppState>,
    Query(query): Query<RevenueQuery>,
) -> AppResult<JsonResponse<Vec<DailyRevenue>>> {
    let offset = state
        .config
        .local_offset()
        .ok_or_else(|| AppError::Internal("Invalid local offset".to_string()))?;
    let today = Utc::now().with_timezone(&offset).date_naive();
    let to = query.to.unwrap_or(today);
    let from = query.from.unwrap_or(to - Duration::days(29));

    let report = statistics::revenue_by_day(&state.db, from, to, offset).await?;
    Ok(ok("Revenue retrieved", report))
}

#[derive(Debug, Deserialize)]
pub struct TopRoutesQuery {
    pub limit: Option<usize>,
}

pub async fn stats_top_routes(
    State(state): State<AppState>,
    Query(query): Query<TopRoutesQuery>,
) -> AppResult<JsonResponse<Vec<RouteRanking>>> {
    let ranking = statistics::top_routes(&state.db, query.limit.unwrap_or(5)).await?;
    Ok(ok("Top routes retrieved", ranking))
}

// ============ Cleanup ============

/// Cancel pending bookings whose payment window has passed
pub async fn cleanup_expired(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<ReclaimReport>> {
    let report =
        cleanup::reclaim_expired(&state.db, Utc::now(), state.config.booking_timeout()).await?;

    if report.failed > 0 {
        tracing::warn!(failed = report.failed, "Some expired bookings could not be cancelled");
    }
    let message = format!("{} expired bookings cancelled", report.cancelled);
    Ok(ok(message, report))
}

pub async fn pending_summary(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<PendingSummary>> {
    let summary = cleanup::pending_summary(
        &state.db,
        Utc::now(),
        state.config.booking_warning(),
        state.config.booking_timeout(),
    )
    .await?;
    Ok(ok("Pending bookings summarized", summary))
}
