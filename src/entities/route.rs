use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "route")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub departure_province_id: i32,
    pub arrival_province_id: i32,
    pub distance_km: f64,
    pub estimated_duration_minutes: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::province::Entity",
        from = "Column::DepartureProvinceId",
        to = "super::province::Column::Id"
    )]
    DepartureProvince,
    #[sea_orm(
        belongs_to = "super::province::Entity",
        from = "Column::ArrivalProvinceId",
        to = "super::province::Column::Id"
    )]
    ArrivalProvince,
    #[sea_orm(has_many = "super::schedule_pattern::Entity")]
    SchedulePatterns,
    #[sea_orm(has_many = "super::schedule::Entity")]
    Schedules,
}

impl Related<super::schedule_pattern::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SchedulePatterns.def()
    }
}

impl Related<super::schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
