pub mod booking;
pub mod cleanup;
pub mod payment;
pub mod route;
pub mod schedule;
pub mod schedule_pattern;
pub mod seat;
pub mod statistics;
