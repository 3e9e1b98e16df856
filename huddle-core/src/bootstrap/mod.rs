//! Startup wiring: configuration, database pool, service construction

mod config;
mod database;
mod services;

pub use config::load_config;
pub use database::init_database;
pub use services::{init_services, Services};
