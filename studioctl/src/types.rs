//! Common type definitions and the caller identity used for authorization.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases for readability:
//!
//! - [`UserId`]: account identifier (owned by the surrounding application)
//! - [`ClassId`]: bookable class
//! - [`SessionId`]: recurring schedule slot
//! - [`SessionClassId`]: link between a session and a class
//! - [`RegistrationId`]: a booking
//! - [`CreditId`]: one ledger row
//!
//! # Authorization
//!
//! Role lookup happens outside this crate. Callers hand the core a [`CurrentUser`] and the core
//! only decides between "own" and "all" access, reporting denials with an [`Operation`] and a
//! [`Resource`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ClassId = Uuid;
pub type SessionId = Uuid;
pub type SessionClassId = Uuid;
pub type RegistrationId = Uuid;
pub type CreditId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

impl CurrentUser {
    pub fn member(id: UserId) -> Self {
        Self { id, role: Role::Member }
    }

    pub fn admin(id: UserId) -> Self {
        Self { id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this caller may act on something owned by `owner`
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.id == owner
    }
}

// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Registrations,
    Credits,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ReadAll | Operation::ReadOwn => write!(f, "read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Registrations => write!(f, "registrations"),
            Resource::Credits => write!(f, "credits"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_can_access() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(CurrentUser::member(owner).can_access(owner));
        assert!(!CurrentUser::member(other).can_access(owner));
        assert!(CurrentUser::admin(other).can_access(owner));
    }
}
