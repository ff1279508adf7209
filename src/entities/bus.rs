use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bus")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub license_plate: String,
    pub seat_count: i32,
    pub bus_type_id: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bus_type::Entity",
        from = "Column::BusTypeId",
        to = "super::bus_type::Column::Id"
    )]
    BusType,
    #[sea_orm(has_many = "super::schedule::Entity")]
    Schedules,
}

impl Related<super::bus_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BusType.def()
    }
}

impl Related<super::schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
