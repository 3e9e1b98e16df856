//! Huddle core
//!
//! Domain layer for the Huddle conferencing backend: configuration,
//! structured logging, the shared error type, domain models, Postgres
//! repositories, and the authentication and meeting services the HTTP
//! and signaling layers are built on.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod service;
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
