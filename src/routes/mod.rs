use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::error::AppResult;
use crate::handlers::{admin, auth, catalog, fleet, network, payment, traveller};
use crate::middleware::auth::{auth_middleware, require_admin, require_customer};
use crate::middleware::rate_limit::log_request;
use crate::middleware::role_rate_limit::create_customer_governor;
use crate::AppState;

pub fn create_router(state: AppState) -> AppResult<Router> {
    let customer_governor = create_customer_governor()?;

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/admin/login", post(auth::admin_login));

    // Catalog and seat maps, no account needed
    let public_routes = Router::new()
        .route("/provinces", get(catalog::list_provinces))
        .route("/provinces/{id}", get(catalog::get_province))
        .route("/stops", get(catalog::list_stops))
        .route("/routes", get(catalog::list_routes))
        .route("/routes/{id}", get(catalog::get_route))
        .route("/schedules/search", get(catalog::search_schedules))
        .route("/schedules/{id}", get(catalog::get_schedule))
        .route("/schedules/{id}/seats", get(catalog::schedule_seats));

    // Called by the payment provider and by the customer's browser
    let payment_routes = Router::new()
        .route("/webhook", post(payment::webhook))
        .route("/return", get(payment::payment_return))
        .route("/cancel", get(payment::payment_cancel));

    // Customer routes (requires auth + customer principal), rate limited per account
    let customer_routes = Router::new()
        .route("/users/me", get(auth::me).put(auth::update_me))
        .route(
            "/bookings",
            post(traveller::create_booking).get(traveller::my_bookings),
        )
        .route(
            "/bookings/{id}",
            get(traveller::get_booking).delete(traveller::cancel_booking),
        )
        .route("/bookings/{id}/payment-link", post(traveller::create_payment_link))
        .route(
            "/feedback",
            post(traveller::submit_feedback).get(traveller::my_feedback),
        )
        .layer(customer_governor)
        .layer(middleware::from_fn(require_customer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        // Reference data
        .route("/stops", post(network::create_stop))
        .route(
            "/stops/{id}",
            put(network::update_stop).delete(network::delete_stop),
        )
        .route(
            "/bus-types",
            get(fleet::list_bus_types).post(fleet::create_bus_type),
        )
        .route(
            "/bus-types/{id}",
            put(fleet::update_bus_type).delete(fleet::delete_bus_type),
        )
        .route("/buses", get(fleet::list_buses).post(fleet::create_bus))
        .route("/buses/{id}", get(fleet::get_bus).put(fleet::update_bus))
        .route("/buses/{id}/status", put(fleet::set_bus_status))
        .route(
            "/drivers",
            get(fleet::list_drivers).post(fleet::create_driver),
        )
        .route(
            "/drivers/{id}",
            put(fleet::update_driver).delete(fleet::deactivate_driver),
        )
        .route(
            "/routes",
            get(network::list_routes).post(network::create_route),
        )
        .route("/routes/{id}", put(network::update_route))
        .route("/routes/{id}/status", put(network::set_route_status))
        // Scheduling
        .route(
            "/schedules",
            get(network::list_schedules).post(network::create_schedule),
        )
        .route(
            "/schedules/{id}",
            put(network::update_schedule).delete(network::delete_schedule),
        )
        .route(
            "/schedule-patterns",
            get(network::list_patterns).post(network::create_pattern),
        )
        .route(
            "/schedule-patterns/{id}",
            get(network::get_pattern)
                .put(network::update_pattern)
                .delete(network::delete_pattern),
        )
        .route(
            "/schedule-patterns/{id}/generate",
            post(network::generate_schedules),
        )
        .route("/seats/{id}", put(admin::set_seat_enabled))
        // Bookings
        .route("/bookings", get(admin::list_bookings))
        .route("/bookings/{id}", get(traveller::get_booking))
        .route("/bookings/{id}/cancel", post(admin::cancel_booking))
        .route("/bookings/{id}/complete", post(admin::complete_booking))
        // Accounts and feedback
        .route("/users", get(admin::list_users))
        .route("/feedback", get(admin::list_feedback))
        // Reports
        .route("/statistics/overview", get(admin::stats_overview))
        .route("/statistics/revenue", get(admin::stats_revenue))
        .route("/statistics/top-routes", get(admin::stats_top_routes))
        .route("/cleanup/expired-bookings", post(admin::cleanup_expired))
        .route("/cleanup/pending-summary", get(admin::pending_summary))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Ok(Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/payments", payment_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", public_routes.merge(customer_routes))
        .layer(middleware::from_fn(log_request))
        .with_state(state))
}
