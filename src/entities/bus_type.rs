use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bus_type")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    /// 1 for seater coaches, 2 for sleeper buses with an upper deck
    pub floors: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bus::Entity")]
    Buses,
}

impl Related<super::bus::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Buses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
