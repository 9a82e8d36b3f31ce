//! Prepares a fresh database.
//!
//! Applies the migrations and loads the standard batches, branches and sample students. If
//! `TPC_ADMIN_EMAIL` and `TPC_ADMIN_PASSWORD` are set and no such user exists yet, an
//! administrator account is created too.

use anyhow::Context;
use std::env;
use tpc_attendance::Settings;
use tracing_subscriber::EnvFilter;

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load().context("loading configuration")?;
    let mut manager = tpc_attendance::create_default_manager(&settings)?;

    let summary = manager.seed_core()?;
    println!(
        "Seeded {} batch(es) and {} student(s)",
        summary.batches, summary.students
    );

    if let (Ok(email), Ok(password)) = (env::var("TPC_ADMIN_EMAIL"), env::var("TPC_ADMIN_PASSWORD")) {
        if manager.find_user_by_email(&email)?.is_none() {
            let admin = manager.create_superuser(&email, "Administrator", &password)?;
            println!("Created admin {}", admin.email);
        }
    }

    Ok(())
}
