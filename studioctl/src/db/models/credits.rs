//! Database models for the prepaid credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::db::models::registrations::Registration;
use crate::types::{CreditId, UserId};

/// Credit namespace stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditGroup {
    Group,
    Private,
    Zoom,
}

impl CreditGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditGroup::Group => "group",
            CreditGroup::Private => "private",
            CreditGroup::Zoom => "zoom",
        }
    }
}

impl fmt::Display for CreditGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CreditGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(CreditGroup::Group),
            "private" => Ok(CreditGroup::Private),
            "zoom" => Ok(CreditGroup::Zoom),
            other => Err(format!("unknown credit group '{other}'")),
        }
    }
}

/// One ledger row: a grant of credits for a single credit group
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionCredit {
    pub id: CreditId,
    pub user_id: UserId,
    pub credit_group: CreditGroup,
    pub remaining_credits: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Absolute overwrite of one ledger row (admin only)
#[derive(Debug, Clone)]
pub struct CreditUpdateDBRequest {
    pub remaining_credits: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Positive-balance summary for one (user, credit group)
#[derive(Debug, Clone, Serialize)]
pub struct CreditCheck {
    pub has_credits: bool,
    pub total_credits: i64,
    pub credits: Vec<SubscriptionCredit>,
}

/// Global ledger aggregate
#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct CreditStatistics {
    pub total_credits: i64,
    pub group_credits: i64,
    pub private_credits: i64,
    pub users_with_credits: i64,
    pub total_rows: i64,
}

/// Ledger rows for a user together with every booking they paid with credits
#[derive(Debug, Clone, Serialize)]
pub struct CreditHistory {
    pub credits: Vec<SubscriptionCredit>,
    pub registrations: Vec<Registration>,
}
