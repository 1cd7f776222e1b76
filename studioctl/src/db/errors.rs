use thiserror::Error;

/// Constraint names the service layer reacts to
pub const ACTIVE_SLOT_UNIQUE: &str = "registrations_active_slot_unique";
pub const TRIAL_USAGE_UNIQUE: &str = "trial_usages_user_class_unique";
pub const CREDITS_NON_NEGATIVE: &str = "subscription_credits_remaining_non_negative";

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
        /// The conflicting key reported by postgres (if extractable)
        conflicting_value: Option<String>,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Whether this is a unique violation on the named constraint
    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(self, DbError::UniqueViolation { constraint: Some(c), .. } if c == name)
    }

    /// Whether this is a check violation on the named constraint
    pub fn is_check_violation_on(&self, name: &str) -> bool {
        matches!(self, DbError::CheckViolation { constraint: Some(c), .. } if c == name)
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let constraint = db_err.constraint().map(|s| s.to_string());

                    let conflicting_value = db_err
                        .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                        .and_then(|pg_err| pg_err.detail())
                        .and_then(extract_conflicting_key);

                    DbError::UniqueViolation {
                        constraint,
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                        conflicting_value,
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract the conflicting key from a PostgreSQL unique violation detail message.
///
/// Details look like: "Key (user_id, class_id)=(..., ...) already exists."
fn extract_conflicting_key(detail: &str) -> Option<String> {
    let start = detail.find("=(")?;
    let rest = &detail[start + 2..];
    let end = rest.rfind(')')?;
    Some(rest[..end].to_string())
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_conflicting_key() {
        let detail = "Key (user_id, class_id)=(a, b) already exists.";
        assert_eq!(extract_conflicting_key(detail).as_deref(), Some("a, b"));
        assert_eq!(extract_conflicting_key("no key here"), None);
    }

    #[test]
    fn test_constraint_matchers() {
        let err = DbError::UniqueViolation {
            constraint: Some(ACTIVE_SLOT_UNIQUE.to_string()),
            table: Some("registrations".to_string()),
            message: "duplicate key".to_string(),
            conflicting_value: None,
        };
        assert!(err.is_unique_violation_on(ACTIVE_SLOT_UNIQUE));
        assert!(!err.is_unique_violation_on(TRIAL_USAGE_UNIQUE));
        assert!(!err.is_check_violation_on(CREDITS_NON_NEGATIVE));
    }
}
