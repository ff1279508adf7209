pub mod admin;
pub mod auth;
pub mod catalog;
pub mod fleet;
pub mod network;
pub mod payment;
pub mod traveller;
