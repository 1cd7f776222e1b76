//! Database record models matching table schemas.
//!
//! Each module contains the row struct (deriving `sqlx::FromRow`) for one table, plus the
//! request and filter types its repository in [`crate::db::handlers`] accepts.
//!
//! - [`classes`]: bookable classes and their credit configuration
//! - [`sessions`]: recurring schedule sessions and session/class links
//! - [`registrations`]: bookings and their status
//! - [`credits`]: the per-user, per-group prepaid ledger
//! - [`trial_usages`]: one-time trial entitlement markers

pub mod classes;
pub mod credits;
pub mod registrations;
pub mod sessions;
pub mod trial_usages;
