//! Database models for bookable classes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::db::models::credits::CreditGroup;
use crate::types::ClassId;

/// Class category stored as free TEXT.
///
/// Only `subscription`, `private` and `trial` carry booking semantics; anything else is kept
/// verbatim so that catalog edits never break decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClassCategory {
    Subscription,
    Private,
    Trial,
    Group,
    Other(String),
}

impl ClassCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ClassCategory::Subscription => "subscription",
            ClassCategory::Private => "private",
            ClassCategory::Trial => "trial",
            ClassCategory::Group => "group",
            ClassCategory::Other(other) => other,
        }
    }

    /// Credit group a booking in this category draws from or refunds to, if any.
    ///
    /// Subscription classes map to `group` credits and private classes to `private` credits.
    pub fn credit_group(&self) -> Option<CreditGroup> {
        match self {
            ClassCategory::Subscription => Some(CreditGroup::Group),
            ClassCategory::Private => Some(CreditGroup::Private),
            _ => None,
        }
    }
}

impl From<String> for ClassCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "subscription" => ClassCategory::Subscription,
            "private" => ClassCategory::Private,
            "trial" => ClassCategory::Trial,
            "group" => ClassCategory::Group,
            _ => ClassCategory::Other(value),
        }
    }
}

impl From<&str> for ClassCategory {
    fn from(value: &str) -> Self {
        ClassCategory::from(value.to_string())
    }
}

impl From<ClassCategory> for String {
    fn from(value: ClassCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ClassCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kinds of sessions a class can be booked into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    Group,
    Private,
    Both,
}

impl ClassType {
    pub fn allows_group(&self) -> bool {
        matches!(self, ClassType::Group | ClassType::Both)
    }

    pub fn allows_private(&self) -> bool {
        matches!(self, ClassType::Private | ClassType::Both)
    }
}

/// Database entity model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub category: ClassCategory,
    pub class_type: ClassType,
    /// Credits granted per purchase
    pub group_credits: i32,
    pub private_credits: i32,
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Class {
    /// Credits a purchase of this class grants into its category's credit group
    pub fn credits_per_purchase(&self) -> Option<(CreditGroup, i32)> {
        match self.category.credit_group()? {
            CreditGroup::Group => Some((CreditGroup::Group, self.group_credits)),
            CreditGroup::Private => Some((CreditGroup::Private, self.private_credits)),
            CreditGroup::Zoom => None,
        }
    }
}

/// Database request for creating a class
#[derive(Debug, Clone)]
pub struct ClassCreateDBRequest {
    pub name: String,
    pub category: ClassCategory,
    pub class_type: ClassType,
    pub group_credits: i32,
    pub private_credits: i32,
    pub price: Decimal,
    pub is_active: bool,
}

/// Only activation and price may change once a class is bookable
#[derive(Debug, Clone, Default)]
pub struct ClassUpdateDBRequest {
    pub is_active: Option<bool>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    pub active_only: bool,
    pub skip: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_unknown_values() {
        let category = ClassCategory::from("pilates-workshop");
        assert_eq!(category, ClassCategory::Other("pilates-workshop".to_string()));
        assert_eq!(category.as_str(), "pilates-workshop");
        assert_eq!(category.credit_group(), None);
    }

    #[test]
    fn test_category_credit_group() {
        assert_eq!(ClassCategory::Subscription.credit_group(), Some(CreditGroup::Group));
        assert_eq!(ClassCategory::Private.credit_group(), Some(CreditGroup::Private));
        assert_eq!(ClassCategory::Trial.credit_group(), None);
    }
}
