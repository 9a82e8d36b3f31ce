//! Attendance tracking for the Training & Placement Cell.
//!
//! Everything goes through an [`AttendanceManager`], which owns the SQLite connection. The
//! `tpc` binary is a thin console over this library.

pub mod accounts;
pub mod attendance;
pub mod audit;
pub mod cli;
pub mod display;
pub mod error;
pub mod import;
pub mod mailer;
pub mod manager;
pub mod models;
pub mod notifications;
pub mod reports;
pub mod schema;
pub mod seed;
pub mod settings;

pub use error::{Error, Result};
pub use manager::AttendanceManager;
pub use settings::Settings;

/// Connects to the database named in the loaded [`Settings`].
pub fn create_default_manager(settings: &Settings) -> Result<AttendanceManager> {
    AttendanceManager::connect(&settings.database_url)
}
