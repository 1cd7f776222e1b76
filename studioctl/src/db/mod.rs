//! Database layer for data persistence and access.
//!
//! ```text
//! ┌───────────────┐
//! │    booking    │  (lifecycle, ledger, availability services)
//! └───────┬───────┘
//!         │
//!         ↓
//! ┌───────────────┐
//! │ Repositories  │  (db::handlers - queries and store-level guards)
//! └───────┬───────┘
//!         │
//!         ↓
//! ┌───────────────┐
//! │    Models     │  (db::models - table rows)
//! └───────┬───────┘
//!         │
//!         ↓
//! ┌───────────────┐
//! │  PostgreSQL   │
//! └───────────────┘
//! ```
//!
//! # Transactions
//!
//! The advisory locks taken by [`handlers::Registrations::lock_occurrence`] and the ledger
//! mutations are transaction scoped. Build repositories from a transaction whenever a read is
//! followed by a dependent write:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut repo = Registrations::new(&mut tx);
//! repo.lock_occurrence(session_id, date, "09:00").await?;
//! let taken = repo.count_active_for_occurrence(session_id, date, "09:00").await?;
//! // ... insert ...
//! tx.commit().await?;
//! ```
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded by [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
