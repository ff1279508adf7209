pub mod admin;
pub mod booking;
pub mod booking_seat;
pub mod bus;
pub mod bus_type;
pub mod driver;
pub mod feedback;
pub mod province;
pub mod route;
pub mod schedule;
pub mod schedule_pattern;
pub mod seat;
pub mod stop;
pub mod user;
