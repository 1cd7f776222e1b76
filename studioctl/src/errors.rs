use crate::db::errors::{ACTIVE_SLOT_UNIQUE, CREDITS_NON_NEGATIVE, DbError, TRIAL_USAGE_UNIQUE};
use crate::db::models::credits::CreditGroup;
use crate::types::{Operation, Resource};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Caller is neither the owner nor an admin
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions { action: Operation, resource: Resource },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Duplicate active booking or duplicate trial usage
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The occurrence has no free spots left
    #[error("No spots left for session {session_id} on {date} at {time} (capacity {max_capacity})")]
    CapacityExceeded {
        session_id: Uuid,
        date: NaiveDate,
        time: String,
        max_capacity: i32,
    },

    /// No positive balance in the requested credit group
    #[error("Insufficient {credit_group} credits")]
    InsufficientCredit { credit_group: CreditGroup },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Caller-facing error classification, independent of transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    CapacityExceeded,
    InsufficientCredit,
    ValidationError,
    InternalFailure,
}

impl Error {
    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict { message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InsufficientPermissions { .. } => ErrorKind::Forbidden,
            Error::BadRequest { .. } => ErrorKind::ValidationError,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Error::InsufficientCredit { .. } => ErrorKind::InsufficientCredit,
            Error::Internal { .. } | Error::Other(_) => ErrorKind::InternalFailure,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => ErrorKind::NotFound,
                err if err.is_unique_violation_on(ACTIVE_SLOT_UNIQUE) || err.is_unique_violation_on(TRIAL_USAGE_UNIQUE) => {
                    ErrorKind::Conflict
                }
                DbError::UniqueViolation { .. } => ErrorKind::Conflict,
                err if err.is_check_violation_on(CREDITS_NON_NEGATIVE) => ErrorKind::InsufficientCredit,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => ErrorKind::ValidationError,
                DbError::Other(_) => ErrorKind::InternalFailure,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InsufficientPermissions { action, resource } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Conflict { message } => message.clone(),
            Error::CapacityExceeded { .. } => "This class is full".to_string(),
            Error::InsufficientCredit { credit_group } => {
                format!("You do not have any {credit_group} credits left")
            }
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                err if err.is_unique_violation_on(ACTIVE_SLOT_UNIQUE) => {
                    "You already have an active registration for this class at this time".to_string()
                }
                err if err.is_unique_violation_on(TRIAL_USAGE_UNIQUE) => "The trial for this class has already been used".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                err if err.is_check_violation_on(CREDITS_NON_NEGATIVE) => "Credit balance cannot go below zero".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
        }
    }

    /// Log at a level matching the severity, mirroring how a transport layer would report it
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::InternalFailure => tracing::error!("Internal service error: {:#}", self),
            ErrorKind::Conflict | ErrorKind::CapacityExceeded | ErrorKind::InsufficientCredit => {
                tracing::warn!("Booking rejected: {}", self)
            }
            ErrorKind::Forbidden => tracing::info!("Authorization error: {}", self),
            ErrorKind::NotFound | ErrorKind::ValidationError => tracing::debug!("Client error: {}", self),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(constraint: &str) -> DbError {
        DbError::UniqueViolation {
            constraint: Some(constraint.to_string()),
            table: None,
            message: "duplicate key value violates unique constraint".to_string(),
            conflicting_value: None,
        }
    }

    #[test]
    fn test_database_errors_map_to_kinds() {
        assert_eq!(Error::from(unique(ACTIVE_SLOT_UNIQUE)).kind(), ErrorKind::Conflict);
        assert_eq!(Error::from(unique(TRIAL_USAGE_UNIQUE)).kind(), ErrorKind::Conflict);
        assert_eq!(Error::from(DbError::NotFound).kind(), ErrorKind::NotFound);

        let negative = DbError::CheckViolation {
            constraint: Some(CREDITS_NON_NEGATIVE.to_string()),
            table: Some("subscription_credits".to_string()),
            message: "new row violates check constraint".to_string(),
        };
        assert_eq!(Error::from(negative).kind(), ErrorKind::InsufficientCredit);

        let other = DbError::Other(anyhow::anyhow!("connection reset"));
        assert_eq!(Error::from(other).kind(), ErrorKind::InternalFailure);
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = Error::from(DbError::Other(anyhow::anyhow!("relation \"registrations\" does not exist")));
        assert_eq!(err.user_message(), "Database error occurred");

        let err = Error::from(unique(ACTIVE_SLOT_UNIQUE));
        assert!(err.user_message().contains("already have an active registration"));
    }

    #[test]
    fn test_service_kinds() {
        assert_eq!(Error::bad_request("too late to cancel").kind(), ErrorKind::ValidationError);
        assert_eq!(
            Error::InsufficientCredit {
                credit_group: CreditGroup::Private
            }
            .kind(),
            ErrorKind::InsufficientCredit
        );
        assert_eq!(
            Error::InsufficientPermissions {
                action: Operation::UpdateOwn,
                resource: Resource::Registrations
            }
            .kind(),
            ErrorKind::Forbidden
        );
    }
}
