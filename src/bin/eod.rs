//! End-of-day absence marking, meant to be run by a scheduler after the last session.
//!
//! Marks every active student without a record absent for each of today's lectures (or the
//! date given as the only argument), retrying with backoff as configured under `[eod]`.

use anyhow::Context;
use chrono::{Local, NaiveDate};
use std::env;
use std::time::Duration;
use tpc_attendance::Settings;
use tpc_attendance::attendance::RetryPolicy;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let date = match env::args().nth(1) {
        Some(arg) => arg
            .parse::<NaiveDate>()
            .with_context(|| format!("invalid date '{arg}', expected YYYY-MM-DD"))?,
        None => Local::now().date_naive(),
    };

    let settings = Settings::load().context("loading configuration")?;
    let mut manager = tpc_attendance::create_default_manager(&settings)?;

    let policy = RetryPolicy {
        max_retries: settings.eod.max_retries,
        min_backoff: Duration::from_secs(settings.eod.min_backoff_secs),
    };
    let summary = manager.run_eod_with_retry(date, policy)?;

    info!(%date, absences = summary.total_absences(), lectures = summary.lectures.len(), "end-of-day run finished");

    Ok(())
}
