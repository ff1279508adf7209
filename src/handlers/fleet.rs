use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;

use crate::entities::{bus, bus_type, driver};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::ensure_super_admin;
use crate::response::{created, ok, CreatedResponse, JsonResponse};
use crate::utils::jwt::Claims;
use crate::AppState;

// ============ Bus types ============

#[derive(Debug, Deserialize)]
pub struct BusTypeRequest {
    pub name: String,
    pub description: Option<String>,
    pub floors: Option<i32>,
}

fn validate_floors(floors: i32) -> AppResult<i32> {
    if !(1..=2).contains(&floors) {
        return Err(AppError::BadRequest("A bus type has 1 or 2 floors".to_string()));
    }
    Ok(floors)
}

pub async fn list_bus_types(
    State(state): State<AppState>,
) -> AppResult<JsonResponse<Vec<bus_type::Model>>> {
    let types = bus_type::Entity::find()
        .order_by_asc(bus_type::Column::Name)
        .all(&state.db)
        .await?;
    Ok(ok("Bus types retrieved", types))
}

pub async fn create_bus_type(
    State(state): State<AppState>,
    Json(payload): Json<BusTypeRequest>,
) -> AppResult<CreatedResponse<bus_type::Model>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    let duplicate = bus_type::Entity::find()
        .filter(bus_type::Column::Name.eq(&name))
        .count(&state.db)
        .await?;
    if duplicate > 0 {
        return Err(AppError::Conflict("Bus type name already exists".to_string()));
    }

    let created_type = bus_type::ActiveModel {
        name: Set(name),
        description: Set(payload.description),
        floors: Set(validate_floors(payload.floors.unwrap_or(1))?),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(created("Bus type created", created_type))
}

pub async fn update_bus_type(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<BusTypeRequest>,
) -> AppResult<JsonResponse<bus_type::Model>> {
    let existing = bus_type::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus type not found".to_string()))?;

    let name = payload.name.trim().to_string();
    let duplicate = bus_type::Entity::find()
        .filter(bus_type::Column::Name.eq(&name))
        .filter(bus_type::Column::Id.ne(id))
        .count(&state.db)
        .await?;
    if duplicate > 0 {
        return Err(AppError::Conflict("Bus type name already exists".to_string()));
    }

    let mut active: bus_type::ActiveModel = existing.into();
    active.name = Set(name);
    active.description = Set(payload.description);
    if let Some(floors) = payload.floors {
        active.floors = Set(validate_floors(floors)?);
    }

    Ok(ok("Bus type updated", active.update(&state.db).await?))
}

pub async fn delete_bus_type(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<()>> {
    ensure_super_admin(&claims)?;

    bus_type::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus type not found".to_string()))?;

    let in_use = bus::Entity::find()
        .filter(bus::Column::BusTypeId.eq(id))
        .count(&state.db)
        .await?;
    if in_use > 0 {
        return Err(AppError::Conflict(format!(
            "Bus type is used by {} buses",
            in_use
        )));
    }

    bus_type::Entity::delete_by_id(id).exec(&state.db).await?;
    Ok(ok("Bus type deleted", ()))
}

// ============ Buses ============

#[derive(Debug, Deserialize)]
pub struct BusRequest {
    pub license_plate: String,
    pub seat_count: i32,
    pub bus_type_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct ActiveFilter {
    pub active: Option<bool>,
}

pub async fn list_buses(
    State(state): State<AppState>,
    Query(filter): Query<ActiveFilter>,
) -> AppResult<JsonResponse<Vec<bus::Model>>> {
    let mut finder = bus::Entity::find();
    if let Some(active) = filter.active {
        finder = finder.filter(bus::Column::IsActive.eq(active));
    }
    let buses = finder
        .order_by_asc(bus::Column::LicensePlate)
        .all(&state.db)
        .await?;
    Ok(ok("Buses retrieved", buses))
}

pub async fn get_bus(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<bus::Model>> {
    let b = bus::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))?;
    Ok(ok("Bus retrieved", b))
}

async fn validate_bus(state: &AppState, payload: &BusRequest, except: Option<i32>) -> AppResult<String> {
    let plate = payload.license_plate.trim().to_uppercase();
    if plate.is_empty() {
        return Err(AppError::BadRequest("License plate is required".to_string()));
    }
    if !(1..=80).contains(&payload.seat_count) {
        return Err(AppError::BadRequest("Seat count must be between 1 and 80".to_string()));
    }

    bus_type::Entity::find_by_id(payload.bus_type_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus type not found".to_string()))?;

    let mut duplicate = bus::Entity::find().filter(bus::Column::LicensePlate.eq(&plate));
    if let Some(id) = except {
        duplicate = duplicate.filter(bus::Column::Id.ne(id));
    }
    if duplicate.count(&state.db).await? > 0 {
        return Err(AppError::Conflict("License plate already registered".to_string()));
    }
    Ok(plate)
}

pub async fn create_bus(
    State(state): State<AppState>,
    Json(payload): Json<BusRequest>,
) -> AppResult<CreatedResponse<bus::Model>> {
    let plate = validate_bus(&state, &payload, None).await?;

    let created_bus = bus::ActiveModel {
        license_plate: Set(plate),
        seat_count: Set(payload.seat_count),
        bus_type_id: Set(payload.bus_type_id),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(bus_id = created_bus.id, "Bus registered");
    Ok(created("Bus created", created_bus))
}

/// Seat count changes only affect trips created afterwards
pub async fn update_bus(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<BusRequest>,
) -> AppResult<JsonResponse<bus::Model>> {
    let existing = bus::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))?;
    let plate = validate_bus(&state, &payload, Some(id)).await?;

    let mut active: bus::ActiveModel = existing.into();
    active.license_plate = Set(plate);
    active.seat_count = Set(payload.seat_count);
    active.bus_type_id = Set(payload.bus_type_id);

    Ok(ok("Bus updated", active.update(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub is_active: bool,
}

pub async fn set_bus_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<JsonResponse<bus::Model>> {
    let existing = bus::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))?;

    let mut active: bus::ActiveModel = existing.into();
    active.is_active = Set(payload.is_active);
    Ok(ok("Bus status updated", active.update(&state.db).await?))
}

// ============ Drivers ============

#[derive(Debug, Deserialize)]
pub struct DriverRequest {
    pub full_name: String,
    pub phone: String,
    pub license_number: String,
}

pub async fn list_drivers(
    State(state): State<AppState>,
    Query(filter): Query<ActiveFilter>,
) -> AppResult<JsonResponse<Vec<driver::Model>>> {
    let mut finder = driver::Entity::find();
    if let Some(active) = filter.active {
        finder = finder.filter(driver::Column::IsActive.eq(active));
    }
    let drivers = finder
        .order_by_asc(driver::Column::FullName)
        .all(&state.db)
        .await?;
    Ok(ok("Drivers retrieved", drivers))
}

async fn ensure_unique_license(state: &AppState, license: &str, except: Option<i32>) -> AppResult<()> {
    let mut finder = driver::Entity::find().filter(driver::Column::LicenseNumber.eq(license));
    if let Some(id) = except {
        finder = finder.filter(driver::Column::Id.ne(id));
    }
    if finder.count(&state.db).await? > 0 {
        return Err(AppError::Conflict("License number already registered".to_string()));
    }
    Ok(())
}

pub async fn create_driver(
    State(state): State<AppState>,
    Json(payload): Json<DriverRequest>,
) -> AppResult<CreatedResponse<driver::Model>> {
    let license = payload.license_number.trim().to_string();
    if payload.full_name.trim().is_empty() || license.is_empty() {
        return Err(AppError::BadRequest(
            "Name and license number are required".to_string(),
        ));
    }
    ensure_unique_license(&state, &license, None).await?;

    let created_driver = driver::ActiveModel {
        full_name: Set(payload.full_name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        license_number: Set(license),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(created("Driver created", created_driver))
}

pub async fn update_driver(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<DriverRequest>,
) -> AppResult<JsonResponse<driver::Model>> {
    let existing = driver::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    let license = payload.license_number.trim().to_string();
    ensure_unique_license(&state, &license, Some(id)).await?;

    let mut active: driver::ActiveModel = existing.into();
    active.full_name = Set(payload.full_name.trim().to_string());
    active.phone = Set(payload.phone.trim().to_string());
    active.license_number = Set(license);

    Ok(ok("Driver updated", active.update(&state.db).await?))
}

/// Drivers are never deleted, only taken off duty
pub async fn deactivate_driver(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<driver::Model>> {
    let existing = driver::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    let mut active: driver::ActiveModel = existing.into();
    active.is_active = Set(false);
    let updated = active.update(&state.db).await?;

    tracing::info!(driver_id = id, "Driver deactivated");
    Ok(ok("Driver deactivated", updated))
}
