use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Recurring template that expands into concrete schedules.
///
/// `departure_times` holds a JSON list of `HH:MM` strings and `days_of_week`
/// a JSON list of ISO weekdays (Monday = 1 .. Sunday = 7).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schedule_pattern")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub route_id: i32,
    pub bus_type_id: i32,
    pub departure_times: String,
    pub days_of_week: String,
    pub base_price: i64,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::route::Entity",
        from = "Column::RouteId",
        to = "super::route::Column::Id"
    )]
    Route,
    #[sea_orm(
        belongs_to = "super::bus_type::Entity",
        from = "Column::BusTypeId",
        to = "super::bus_type::Column::Id"
    )]
    BusType,
    #[sea_orm(has_many = "super::schedule::Entity")]
    Schedules,
}

impl Related<super::route::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Route.def()
    }
}

impl Related<super::schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
