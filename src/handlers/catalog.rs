use axum::extract::{Path, Query, State};
use chrono::{NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;

use crate::entities::stop::{self, StopType};
use crate::entities::province;
use crate::error::{AppError, AppResult};
use crate::response::{ok, JsonResponse};
use crate::services::route as routes;
use crate::services::schedule::{self as schedules, RouteSummary, ScheduleDetail, ScheduleListing, SearchQuery};
use crate::services::seat::{self as seats, SeatMap};
use crate::AppState;

/// List all provinces
pub async fn list_provinces(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<Vec<province::Model>>> {
    let provinces = province::Entity::find()
        .order_by_asc(province::Column::Name)
        .all(&state.db)
        .await?;
    Ok(ok("Provinces retrieved", provinces))
}

pub async fn get_province(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<province::Model>> {
    let p = province::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Province not found".to_string()))?;
    Ok(ok("Province retrieved", p))
}

#[derive(Debug, Deserialize)]
pub struct StopQuery {
    pub province_id: Option<i32>,
    pub stop_type: Option<StopType>,
}

/// Pickup and dropoff points, optionally narrowed to a province or type
pub async fn list_stops(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
) -> AppResult<JsonResponse<Vec<stop::Model>>> {
    let mut finder = stop::Entity::find();
    if let Some(province_id) = query.province_id {
        finder = finder.filter(stop::Column::ProvinceId.eq(province_id));
    }
    if let Some(stop_type) = query.stop_type {
        finder = finder.filter(stop::Column::StopType.eq(stop_type));
    }
    let stops = finder.order_by_asc(stop::Column::Name).all(&state.db).await?;
    Ok(ok("Stops retrieved", stops))
}

/// Active routes
pub async fn list_routes(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<Vec<RouteSummary>>> {
    Ok(ok("Routes retrieved", routes::list_routes(&state.db, false).await?))
}

pub async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<RouteSummary>> {
    Ok(ok("Route retrieved", routes::get_route(&state.db, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub departure_province_id: Option<i32>,
    pub arrival_province_id: Option<i32>,
    pub date: Option<NaiveDate>,
}

/// Trips between two provinces on a local calendar day
pub async fn search_schedules(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<JsonResponse<Vec<ScheduleListing>>> {
    let (Some(departure_province_id), Some(arrival_province_id), Some(date)) =
        (params.departure_province_id, params.arrival_province_id, params.date)
    else {
        return Err(AppError::BadRequest(
            "departure_province_id, arrival_province_id and date are required".to_string(),
        ));
    };

    let offset = state
        .config
        .local_offset()
        .ok_or_else(|| AppError::Internal("Invalid local offset".to_string()))?;

    let listings = schedules::search_schedules(
        &state.db,
        SearchQuery {
            departure_province_id,
            arrival_province_id,
            date,
        },
        offset,
        Utc::now(),
    )
    .await?;

    Ok(ok("Schedules retrieved", listings))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<ScheduleDetail>> {
    Ok(ok("Schedule retrieved", schedules::get_schedule(&state.db, id).await?))
}

/// Seat map with live hold countdowns
pub async fn schedule_seats(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<SeatMap>> {
    let map = seats::seat_map(&state.db, id, Utc::now(), state.config.booking_timeout()).await?;
    Ok(ok("Seat map retrieved", map))
}
