pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_provinces_and_stops;
mod m20250301_000002_create_accounts;
mod m20250301_000003_create_fleet;
mod m20250301_000004_create_routes;
mod m20250301_000005_create_schedules;
mod m20250301_000006_create_bookings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_provinces_and_stops::Migration),
            Box::new(m20250301_000002_create_accounts::Migration),
            Box::new(m20250301_000003_create_fleet::Migration),
            Box::new(m20250301_000004_create_routes::Migration),
            Box::new(m20250301_000005_create_schedules::Migration),
            Box::new(m20250301_000006_create_bookings::Migration),
        ]
    }
}
