//! # studioctl: booking core of a fitness and dance studio
//!
//! `studioctl` owns the part of the studio app where money and capacity meet: members book class
//! occurrences, pay with subscription credits or a one-off purchase, and cancel within the
//! studio's policy. Admins reactivate or remove bookings and manage credit balances.
//!
//! ## Overview
//!
//! Every state change goes through [`booking::RegistrationManager`] or
//! [`booking::CreditLedger`]. Each runs its database work in one PostgreSQL transaction, so a
//! booking and the credit it consumed are committed together or not at all. Capacity checks
//! serialize on a transaction-scoped advisory lock per occurrence, and a partial unique index
//! keeps a member from holding two active bookings for the same class at the same time.
//!
//! Authentication is not handled here. Callers pass a [`types::CurrentUser`] carrying the
//! caller's id and role.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use studioctl::{Config, booking::RegistrationManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = studioctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     studioctl::telemetry::init_telemetry(&config.telemetry)?;
//!
//!     let pool = studioctl::connect_pool(&config.database).await?;
//!     studioctl::migrator().run(&pool).await?;
//!
//!     let manager = RegistrationManager::builder().db(pool).config(config.booking).build();
//!     # let _ = manager;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod booking;
pub mod config;
pub mod db;
pub mod errors;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

pub use config::Config;
pub use errors::{Error, ErrorKind, Result};
pub use types::{ClassId, CreditId, CurrentUser, RegistrationId, SessionId, UserId};

/// Get the studioctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Open the connection pool described by the database section of the config
#[instrument(skip(config), err)]
pub async fn connect_pool(config: &config::DatabaseConfig) -> anyhow::Result<PgPool> {
    let settings = &config.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(non_zero_secs(settings.idle_timeout_secs))
        .max_lifetime(non_zero_secs(settings.max_lifetime_secs))
        .connect(&config.url)
        .await?;

    info!(max_connections = settings.max_connections, "Database pool ready");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeouts_mean_never() {
        assert_eq!(non_zero_secs(0), None);
        assert_eq!(non_zero_secs(30), Some(Duration::from_secs(30)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_migrations_create_booking_tables(pool: PgPool) {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for table in ["classes", "registrations", "schedule_sessions", "session_classes", "subscription_credits", "trial_usages"] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }
}
