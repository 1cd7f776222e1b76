//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection (ideally a transaction), binds parameters, and
//! returns models from [`crate::db::models`].
//!
//! - [`Classes`]: bookable classes
//! - [`ScheduleSessions`]: recurring sessions and session/class links
//! - [`Registrations`]: bookings, occurrence locks and capacity counts
//! - [`Credits`]: the FIFO prepaid ledger
//! - [`TrialUsages`]: trial entitlement markers
//!
//! ```ignore
//! use studioctl::db::handlers::{Registrations, Repository};
//!
//! let mut tx = pool.begin().await?;
//! let mut repo = Registrations::new(&mut tx);
//! let registration = repo.get_by_id(id).await?;
//! tx.commit().await?;
//! ```

pub mod classes;
pub mod credits;
pub mod registrations;
pub mod repository;
pub mod sessions;
pub mod trial_usages;

pub use classes::Classes;
pub use credits::Credits;
pub use registrations::Registrations;
pub use repository::Repository;
pub use sessions::ScheduleSessions;
pub use trial_usages::TrialUsages;
