use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entities::{province, route, schedule_pattern};
use crate::error::{AppError, AppResult};
use crate::services::schedule::{Catalog, RouteSummary};

#[derive(Debug, Deserialize)]
pub struct RouteInput {
    pub departure_province_id: i32,
    pub arrival_province_id: i32,
    pub distance_km: f64,
    pub estimated_duration_minutes: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteStatusChange {
    pub route: RouteSummary,
    pub affected_patterns_count: u64,
}

async fn validate(db: &DatabaseConnection, input: &RouteInput) -> AppResult<()> {
    if input.departure_province_id == input.arrival_province_id {
        return Err(AppError::BadRequest(
            "Departure and arrival provinces must differ".to_string(),
        ));
    }
    if input.distance_km <= 0.0 || input.estimated_duration_minutes <= 0 {
        return Err(AppError::BadRequest(
            "Distance and duration must be positive".to_string(),
        ));
    }
    for id in [input.departure_province_id, input.arrival_province_id] {
        province::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Province {} not found", id)))?;
    }
    Ok(())
}

pub async fn list_routes(db: &DatabaseConnection, include_inactive: bool) -> AppResult<Vec<RouteSummary>> {
    let mut finder = route::Entity::find();
    if !include_inactive {
        finder = finder.filter(route::Column::IsActive.eq(true));
    }
    let routes = finder.order_by_asc(route::Column::Id).all(db).await?;

    let catalog = Catalog::load(db).await?;
    routes.iter().map(|r| catalog.route_summary(r)).collect()
}

pub async fn get_route(db: &DatabaseConnection, id: i32) -> AppResult<RouteSummary> {
    let r = route::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;
    Catalog::load(db).await?.route_summary(&r)
}

pub async fn create_route(db: &DatabaseConnection, input: RouteInput) -> AppResult<RouteSummary> {
    validate(db, &input).await?;

    let created = route::ActiveModel {
        departure_province_id: Set(input.departure_province_id),
        arrival_province_id: Set(input.arrival_province_id),
        distance_km: Set(input.distance_km),
        estimated_duration_minutes: Set(input.estimated_duration_minutes),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(route_id = created.id, "Route created");
    Catalog::load(db).await?.route_summary(&created)
}

pub async fn update_route(db: &DatabaseConnection, id: i32, input: RouteInput) -> AppResult<RouteSummary> {
    let existing = route::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;
    validate(db, &input).await?;

    let mut active: route::ActiveModel = existing.into();
    active.departure_province_id = Set(input.departure_province_id);
    active.arrival_province_id = Set(input.arrival_province_id);
    active.distance_km = Set(input.distance_km);
    active.estimated_duration_minutes = Set(input.estimated_duration_minutes);
    let updated = active.update(db).await?;

    Catalog::load(db).await?.route_summary(&updated)
}

/// Activate or deactivate a route. Deactivation also deactivates every
/// active pattern of the route; activation leaves patterns untouched.
pub async fn set_route_status(
    db: &DatabaseConnection,
    id: i32,
    is_active: bool,
) -> AppResult<RouteStatusChange> {
    let txn = db.begin().await?;

    let existing = route::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;

    let mut active: route::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    let updated = active.update(&txn).await?;

    let affected_patterns_count = if is_active {
        0
    } else {
        schedule_pattern::Entity::update_many()
            .set(schedule_pattern::ActiveModel {
                is_active: Set(false),
                ..Default::default()
            })
            .filter(schedule_pattern::Column::RouteId.eq(id))
            .filter(schedule_pattern::Column::IsActive.eq(true))
            .exec(&txn)
            .await?
            .rows_affected
    };

    txn.commit().await?;

    tracing::info!(route_id = id, is_active, affected_patterns_count, "Route status changed");

    Ok(RouteStatusChange {
        route: Catalog::load(db).await?.route_summary(&updated)?,
        affected_patterns_count,
    })
}
