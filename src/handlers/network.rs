use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::Deserialize;

use crate::entities::schedule::ScheduleStatus;
use crate::entities::stop::{self, StopType};
use crate::entities::{booking, booking_seat, province};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::ensure_super_admin;
use crate::response::{created, ok, CreatedResponse, JsonResponse, Page, Pagination};
use crate::services::route::{self as routes, RouteInput, RouteStatusChange};
use crate::services::schedule::{self as schedules, NewSchedule, RouteSummary, ScheduleFilter, TripSummary, UpdateSchedule};
use crate::services::schedule_pattern::{self as patterns, GenerateRequest, GenerationReport, PatternInput, PatternView};
use crate::utils::jwt::Claims;
use crate::AppState;

// ============ Stops ============

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub province_id: i32,
    pub name: String,
    pub address: String,
    pub stop_type: StopType,
}

async fn validate_stop(state: &AppState, payload: &StopRequest) -> AppResult<()> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("Stop name is required".to_string()));
    }
    province::Entity::find_by_id(payload.province_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Province not found".to_string()))?;
    Ok(())
}

pub async fn create_stop(
    State(state): State<AppState>,
    Json(payload): Json<StopRequest>,
) -> AppResult<CreatedResponse<stop::Model>> {
    validate_stop(&state, &payload).await?;

    let created_stop = stop::ActiveModel {
        province_id: Set(payload.province_id),
        name: Set(payload.name.trim().to_string()),
        address: Set(payload.address.trim().to_string()),
        stop_type: Set(payload.stop_type),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(created("Stop created", created_stop))
}

pub async fn update_stop(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<StopRequest>,
) -> AppResult<JsonResponse<stop::Model>> {
    let existing = stop::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stop not found".to_string()))?;
    validate_stop(&state, &payload).await?;

    let mut active: stop::ActiveModel = existing.into();
    active.province_id = Set(payload.province_id);
    active.name = Set(payload.name.trim().to_string());
    active.address = Set(payload.address.trim().to_string());
    active.stop_type = Set(payload.stop_type);

    Ok(ok("Stop updated", active.update(&state.db).await?))
}

/// Stops referenced by any booking stay, to keep booking history readable
pub async fn delete_stop(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<()>> {
    ensure_super_admin(&claims)?;

    stop::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stop not found".to_string()))?;

    let referenced = booking::Entity::find()
        .filter(
            booking::Column::PickupStopId
                .eq(id)
                .or(booking::Column::DropoffStopId.eq(id)),
        )
        .count(&state.db)
        .await?
        + booking_seat::Entity::find()
            .filter(
                booking_seat::Column::PickupStopId
                    .eq(id)
                    .or(booking_seat::Column::DropoffStopId.eq(id)),
            )
            .count(&state.db)
            .await?;
    if referenced > 0 {
        return Err(AppError::Conflict("Stop is referenced by bookings".to_string()));
    }

    stop::Entity::delete_by_id(id).exec(&state.db).await?;
    Ok(ok("Stop deleted", ()))
}

// ============ Routes ============

/// Every route, inactive ones included
pub async fn list_routes(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<Vec<RouteSummary>>> {
    Ok(ok("Routes retrieved", routes::list_routes(&state.db, true).await?))
}

pub async fn create_route(
    State(state): State<AppState>,
    Json(payload): Json<RouteInput>,
) -> AppResult<CreatedResponse<RouteSummary>> {
    Ok(created("Route created", routes::create_route(&state.db, payload).await?))
}

pub async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RouteInput>,
) -> AppResult<JsonResponse<RouteSummary>> {
    Ok(ok("Route updated", routes::update_route(&state.db, id, payload).await?))
}

#[derive(Debug, Deserialize)]
pub struct RouteStatusRequest {
    pub is_active: bool,
}

/// Disabling a route also disables its schedule patterns
pub async fn set_route_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RouteStatusRequest>,
) -> AppResult<JsonResponse<RouteStatusChange>> {
    let change = routes::set_route_status(&state.db, id, payload.is_active).await?;
    let message = if payload.is_active {
        "Route activated".to_string()
    } else {
        format!(
            "Route deactivated, {} schedule patterns disabled",
            change.affected_patterns_count
        )
    };
    Ok(ok(message, change))
}

// ============ Schedules ============

#[derive(Debug, Deserialize)]
pub struct ScheduleListQuery {
    pub route_id: Option<i32>,
    pub status: Option<ScheduleStatus>,
    pub pattern_id: Option<i32>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<ScheduleListQuery>,
) -> AppResult<JsonResponse<Page<TripSummary>>> {
    let page = schedules::list_schedules(
        &state.db,
        ScheduleFilter {
            route_id: query.route_id,
            status: query.status,
            pattern_id: query.pattern_id,
        },
        Pagination {
            page: query.page,
            per_page: query.per_page,
        },
    )
    .await?;
    Ok(ok("Schedules retrieved", page))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(payload): Json<NewSchedule>,
) -> AppResult<CreatedResponse<TripSummary>> {
    Ok(created("Schedule created", schedules::create_schedule(&state.db, payload).await?))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateSchedule>,
) -> AppResult<JsonResponse<TripSummary>> {
    Ok(ok("Schedule updated", schedules::update_schedule(&state.db, id, payload).await?))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<()>> {
    schedules::delete_schedule(&state.db, id).await?;
    tracing::info!(schedule_id = id, "Schedule deleted");
    Ok(ok("Schedule deleted", ()))
}

// ============ Schedule patterns ============

#[derive(Debug, Deserialize)]
pub struct PatternQuery {
    pub route_id: Option<i32>,
}

pub async fn list_patterns(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> AppResult<JsonResponse<Vec<PatternView>>> {
    Ok(ok("Schedule patterns retrieved", patterns::list_patterns(&state.db, query.route_id).await?))
}

pub async fn get_pattern(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<PatternView>> {
    Ok(ok("Schedule pattern retrieved", patterns::get_pattern(&state.db, id).await?))
}

pub async fn create_pattern(
    State(state): State<AppState>,
    Json(payload): Json<PatternInput>,
) -> AppResult<CreatedResponse<PatternView>> {
    Ok(created("Schedule pattern created", patterns::create_pattern(&state.db, payload).await?))
}

pub async fn update_pattern(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<PatternInput>,
) -> AppResult<JsonResponse<PatternView>> {
    Ok(ok("Schedule pattern updated", patterns::update_pattern(&state.db, id, payload).await?))
}

pub async fn delete_pattern(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<()>> {
    patterns::delete_pattern(&state.db, id).await?;
    Ok(ok("Schedule pattern deleted", ()))
}

/// Create concrete trips from a pattern for a date range
pub async fn generate_schedules(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<CreatedResponse<GenerationReport>> {
    let offset = state
        .config
        .local_offset()
        .ok_or_else(|| AppError::Internal("Invalid local offset".to_string()))?;

    let report = patterns::generate_schedules(&state.db, id, payload, offset).await?;
    let message = format!(
        "{} schedules created, {} skipped",
        report.created.len(),
        report.skipped
    );
    Ok(created(message, report))
}
