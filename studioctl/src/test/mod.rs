//! Shared fixtures for store-backed tests.

pub mod utils;
