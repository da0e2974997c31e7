//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Row models and pagination envelopes

mod database;
mod models;

pub use database::{Database, ThreadFilter, ThreadOrder};
pub use models::*;
