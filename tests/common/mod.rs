#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use sea_orm_migration::MigratorTrait;

use bus_ticketing::config::{Config, PaymentConfig};
use bus_ticketing::entities::{bus, bus_type, route, seat, stop, user};
use bus_ticketing::entities::stop::StopType;
use bus_ticketing::routes::create_router;
use bus_ticketing::services::payment::{PaymentGateway, PaymentLink, PaymentLinkRequest};
use bus_ticketing::services::schedule::{self, NewSchedule, TripSummary};
use bus_ticketing::utils::jwt::{create_token, Principal};
use bus_ticketing::{AppResult, AppState};

pub const CHECKSUM_KEY: &str = "test-checksum";
pub const JWT_SECRET: &str = "test-secret";
pub const SEAT_PRICE: i64 = 250_000;

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration_hours: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        frontend_url: "http://frontend.test".to_string(),
        backend_url: "http://backend.test".to_string(),
        payment: PaymentConfig {
            client_id: "client".to_string(),
            api_key: "api-key".to_string(),
            checksum_key: CHECKSUM_KEY.to_string(),
            api_url: "http://payments.test".to_string(),
        },
        booking_timeout_minutes: 5,
        booking_warning_minutes: 3,
        local_utc_offset_minutes: 420,
        admin_username: "admin".to_string(),
        admin_password: "admin123".to_string(),
    }
}

/// Hands out predictable links and counts how often it was asked.
#[derive(Default)]
pub struct StubGateway {
    pub calls: AtomicUsize,
}

impl StubGateway {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> AppResult<PaymentLink> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentLink {
            payment_request_id: format!("plink-{}", request.order_code),
            checkout_url: format!("https://pay.test/checkout/{}", request.order_code),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        // a single connection keeps the in-memory database alive and shared
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1).sqlx_logging(false);

        let db = Database::connect(options).await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();

        let gateway = Arc::new(StubGateway::default());
        let state = AppState {
            db,
            config: test_config(),
            payments: gateway.clone(),
        };

        Self { state, gateway }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone()).unwrap()
    }

    pub fn customer_token(&self, u: &user::Model) -> String {
        create_token(u.id, &u.email, Principal::Customer, None, JWT_SECRET, 1).unwrap()
    }

    pub async fn create_user(&self, email: &str) -> user::Model {
        user::ActiveModel {
            email: Set(email.to_string()),
            // never used to log in
            password_hash: Set("not-a-hash".to_string()),
            full_name: Set("Nguyen Van A".to_string()),
            phone: Set(Some("0901234567".to_string())),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .unwrap()
    }

    pub async fn create_bus(&self, plate: &str, seat_count: i32, floors: i32) -> bus::Model {
        let bus_type = bus_type::ActiveModel {
            name: Set(format!("Type {}", plate)),
            description: Set(None),
            floors: Set(floors),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .unwrap();

        bus::ActiveModel {
            license_plate: Set(plate.to_string()),
            seat_count: Set(seat_count),
            bus_type_id: Set(bus_type.id),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .unwrap()
    }

    /// Hà Nội (1) to TP. Hồ Chí Minh (6), both seeded by the migrations.
    pub async fn create_route(&self) -> route::Model {
        route::ActiveModel {
            departure_province_id: Set(1),
            arrival_province_id: Set(6),
            distance_km: Set(1650.0),
            estimated_duration_minutes: Set(1800),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .unwrap()
    }

    pub async fn create_stop(&self, province_id: i32, name: &str, stop_type: StopType) -> stop::Model {
        stop::ActiveModel {
            province_id: Set(province_id),
            name: Set(name.to_string()),
            address: Set(format!("{} street", name)),
            stop_type: Set(stop_type),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .unwrap()
    }

    /// A trip departing in three days with `seat_count` single-floor seats.
    pub async fn create_trip(&self, plate: &str, seat_count: i32) -> TripSummary {
        let r = self.create_route().await;
        let b = self.create_bus(plate, seat_count, 1).await;

        schedule::create_schedule(
            self.db(),
            NewSchedule {
                route_id: r.id,
                bus_id: b.id,
                driver_id: None,
                departure_time: Utc::now() + Duration::days(3),
                price: SEAT_PRICE,
            },
        )
        .await
        .unwrap()
    }

    pub async fn seats_of(&self, schedule_id: i32) -> Vec<seat::Model> {
        seat::Entity::find()
            .filter(seat::Column::ScheduleId.eq(schedule_id))
            .order_by_asc(seat::Column::Id)
            .all(self.db())
            .await
            .unwrap()
    }
}
