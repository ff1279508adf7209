use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entities::{bus_type, route, schedule, schedule_pattern};
use crate::error::{AppError, AppResult};
use crate::services::schedule::{
    active_bus_with_floors, bus_is_taken, ensure_active_driver, insert_trip, TripPlan,
};

/// Longest date range a single generation call may cover, in days.
pub const MAX_GENERATION_DAYS: i64 = 62;

#[derive(Debug, Clone, Deserialize)]
pub struct PatternInput {
    pub name: String,
    pub route_id: i32,
    pub bus_type_id: i32,
    pub departure_times: Vec<String>,
    pub days_of_week: Vec<u8>,
    pub base_price: i64,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternView {
    pub id: i32,
    pub name: String,
    pub route_id: i32,
    pub bus_type_id: i32,
    pub departure_times: Vec<String>,
    pub days_of_week: Vec<u8>,
    pub base_price: i64,
    pub is_active: bool,
}

/// Parse `HH:MM` departure times, sorted and deduplicated.
pub fn parse_times(times: &[String]) -> AppResult<Vec<NaiveTime>> {
    if times.is_empty() {
        return Err(AppError::BadRequest(
            "At least one departure time is required".to_string(),
        ));
    }

    let mut parsed = BTreeSet::new();
    for raw in times {
        let t = NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
            AppError::BadRequest(format!("Invalid departure time '{}', expected HH:MM", raw))
        })?;
        parsed.insert(t);
    }
    Ok(parsed.into_iter().collect())
}

/// Validate ISO weekdays (Monday = 1 .. Sunday = 7), sorted and deduplicated.
pub fn normalize_days(days: &[u8]) -> AppResult<Vec<u8>> {
    if days.is_empty() {
        return Err(AppError::BadRequest(
            "At least one day of week is required".to_string(),
        ));
    }
    if let Some(bad) = days.iter().find(|d| !(1..=7).contains(*d)) {
        return Err(AppError::BadRequest(format!(
            "Invalid day of week {}, expected 1 (Monday) to 7 (Sunday)",
            bad
        )));
    }
    let set: BTreeSet<u8> = days.iter().copied().collect();
    Ok(set.into_iter().collect())
}

fn format_times(times: &[NaiveTime]) -> Vec<String> {
    times.iter().map(|t| t.format("%H:%M").to_string()).collect()
}

fn encode<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode pattern: {}", e)))
}

fn decode(p: schedule_pattern::Model) -> AppResult<PatternView> {
    let departure_times: Vec<String> = serde_json::from_str(&p.departure_times)
        .map_err(|e| AppError::Internal(format!("Corrupt departure times on pattern {}: {}", p.id, e)))?;
    let days_of_week: Vec<u8> = serde_json::from_str(&p.days_of_week)
        .map_err(|e| AppError::Internal(format!("Corrupt weekdays on pattern {}: {}", p.id, e)))?;

    Ok(PatternView {
        id: p.id,
        name: p.name,
        route_id: p.route_id,
        bus_type_id: p.bus_type_id,
        departure_times,
        days_of_week,
        base_price: p.base_price,
        is_active: p.is_active,
    })
}

/// Every UTC departure the pattern produces between two local dates, inclusive.
pub fn expand_departures(
    times: &[NaiveTime],
    days: &[u8],
    from: NaiveDate,
    to: NaiveDate,
    offset: FixedOffset,
) -> AppResult<Vec<DateTime<Utc>>> {
    if to < from {
        return Err(AppError::BadRequest(
            "End date must not be before start date".to_string(),
        ));
    }
    if (to - from).num_days() + 1 > MAX_GENERATION_DAYS {
        return Err(AppError::BadRequest(format!(
            "Date range cannot exceed {} days",
            MAX_GENERATION_DAYS
        )));
    }

    let mut departures = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        let weekday = date.weekday().number_from_monday() as u8;
        if !days.contains(&weekday) {
            continue;
        }
        for t in times {
            let local = offset
                .from_local_datetime(&date.and_time(*t))
                .single()
                .ok_or_else(|| AppError::BadRequest("Invalid local departure time".to_string()))?;
            departures.push(local.with_timezone(&Utc));
        }
    }
    Ok(departures)
}

async fn validate_refs<C: ConnectionTrait>(conn: &C, input: &PatternInput) -> AppResult<()> {
    route::Entity::find_by_id(input.route_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;
    bus_type::Entity::find_by_id(input.bus_type_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus type not found".to_string()))?;
    Ok(())
}

async fn ensure_unique_name<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    except: Option<i32>,
) -> AppResult<()> {
    let mut finder = schedule_pattern::Entity::find().filter(schedule_pattern::Column::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(schedule_pattern::Column::Id.ne(id));
    }
    if finder.count(conn).await? > 0 {
        return Err(AppError::Conflict(
            "Schedule pattern name already exists".to_string(),
        ));
    }
    Ok(())
}

struct ValidatedPattern {
    name: String,
    times: String,
    days: String,
}

fn validate_input(input: &PatternInput) -> AppResult<ValidatedPattern> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Pattern name is required".to_string()));
    }
    if input.base_price <= 0 {
        return Err(AppError::BadRequest("Base price must be positive".to_string()));
    }
    let times = parse_times(&input.departure_times)?;
    let days = normalize_days(&input.days_of_week)?;

    Ok(ValidatedPattern {
        name,
        times: encode(&format_times(&times))?,
        days: encode(&days)?,
    })
}

pub async fn create_pattern(db: &DatabaseConnection, input: PatternInput) -> AppResult<PatternView> {
    let valid = validate_input(&input)?;
    validate_refs(db, &input).await?;
    ensure_unique_name(db, &valid.name, None).await?;

    let created = schedule_pattern::ActiveModel {
        name: Set(valid.name),
        route_id: Set(input.route_id),
        bus_type_id: Set(input.bus_type_id),
        departure_times: Set(valid.times),
        days_of_week: Set(valid.days),
        base_price: Set(input.base_price),
        is_active: Set(input.is_active.unwrap_or(true)),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(pattern_id = created.id, route_id = created.route_id, "Schedule pattern created");
    decode(created)
}

pub async fn update_pattern(
    db: &DatabaseConnection,
    id: i32,
    input: PatternInput,
) -> AppResult<PatternView> {
    let existing = schedule_pattern::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule pattern not found".to_string()))?;

    let valid = validate_input(&input)?;
    validate_refs(db, &input).await?;
    ensure_unique_name(db, &valid.name, Some(id)).await?;

    let mut active: schedule_pattern::ActiveModel = existing.into();
    active.name = Set(valid.name);
    active.route_id = Set(input.route_id);
    active.bus_type_id = Set(input.bus_type_id);
    active.departure_times = Set(valid.times);
    active.days_of_week = Set(valid.days);
    active.base_price = Set(input.base_price);
    if let Some(is_active) = input.is_active {
        active.is_active = Set(is_active);
    }

    decode(active.update(db).await?)
}

pub async fn list_patterns(db: &DatabaseConnection, route_id: Option<i32>) -> AppResult<Vec<PatternView>> {
    let mut finder = schedule_pattern::Entity::find();
    if let Some(route_id) = route_id {
        finder = finder.filter(schedule_pattern::Column::RouteId.eq(route_id));
    }
    finder
        .order_by_asc(schedule_pattern::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

pub async fn get_pattern(db: &DatabaseConnection, id: i32) -> AppResult<PatternView> {
    let p = schedule_pattern::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule pattern not found".to_string()))?;
    decode(p)
}

pub async fn delete_pattern(db: &DatabaseConnection, id: i32) -> AppResult<()> {
    schedule_pattern::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule pattern not found".to_string()))?;

    let used_by = schedule::Entity::find()
        .filter(schedule::Column::PatternId.eq(id))
        .count(db)
        .await?;
    if used_by > 0 {
        return Err(AppError::Conflict(format!(
            "Cannot delete pattern used by {} schedules",
            used_by
        )));
    }

    schedule_pattern::Entity::delete_by_id(id).exec(db).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub bus_id: i32,
    pub driver_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationReport {
    pub created: Vec<i32>,
    pub skipped: usize,
}

/// Materialize the pattern into schedules for the requested dates.
pub async fn generate_schedules(
    db: &DatabaseConnection,
    pattern_id: i32,
    request: GenerateRequest,
    offset: FixedOffset,
) -> AppResult<GenerationReport> {
    let now = Utc::now();
    let txn = db.begin().await?;

    let pattern = schedule_pattern::Entity::find_by_id(pattern_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule pattern not found".to_string()))?;
    if !pattern.is_active {
        return Err(AppError::BadRequest("Schedule pattern is inactive".to_string()));
    }

    let r = route::Entity::find_by_id(pattern.route_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;
    if !r.is_active {
        return Err(AppError::BadRequest("Route is inactive".to_string()));
    }

    let (b, floors) = active_bus_with_floors(&txn, request.bus_id).await?;
    if b.bus_type_id != pattern.bus_type_id {
        return Err(AppError::BadRequest(
            "Bus type does not match the pattern".to_string(),
        ));
    }
    ensure_active_driver(&txn, request.driver_id).await?;

    let view = decode(pattern.clone())?;
    let times = parse_times(&view.departure_times)?;
    let departures = expand_departures(
        &times,
        &view.days_of_week,
        request.from_date,
        request.to_date,
        offset,
    )?;

    let mut report = GenerationReport {
        created: Vec::new(),
        skipped: 0,
    };

    for departure in departures {
        if departure <= now || bus_is_taken(&txn, b.id, departure, None).await? {
            report.skipped += 1;
            continue;
        }
        let created = insert_trip(
            &txn,
            TripPlan {
                route: &r,
                bus: &b,
                floors,
                driver_id: request.driver_id,
                departure,
                price: pattern.base_price,
                pattern_id: Some(pattern.id),
            },
            now,
        )
        .await?;
        report.created.push(created.id);
    }

    txn.commit().await?;

    tracing::info!(
        pattern_id,
        bus_id = b.id,
        created = report.created.len(),
        skipped = report.skipped,
        "Schedules generated from pattern"
    );
    Ok(report)
}
