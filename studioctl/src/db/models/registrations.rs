//! Database models for class registrations.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::db::models::credits::CreditGroup;
use crate::types::{ClassId, RegistrationId, SessionClassId, SessionId, UserId};

/// Registration status stored as TEXT in database.
///
/// `Pending` is decoded for compatibility with historical rows but no operation produces it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Active,
    Cancelled,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStatus::Pending => write!(f, "pending"),
            RegistrationStatus::Active => write!(f, "active"),
            RegistrationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Database entity model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub user_id: UserId,
    pub class_id: ClassId,
    pub session_id: Option<SessionId>,
    pub session_class_id: Option<SessionClassId>,
    pub selected_date: Option<NaiveDate>,
    /// Time string as submitted, possibly compound ("09:00-10:00")
    pub selected_time: Option<String>,
    /// Normalized start component of `selected_time`
    pub slot_time: Option<String>,
    pub status: RegistrationStatus,
    pub used_credit: bool,
    pub credit_type: Option<CreditGroup>,
    pub purchase_price: Option<Decimal>,
    pub terms_accepted: bool,
    pub health_declaration_accepted: bool,
    pub cancellation_policy_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Active
    }

    /// Whether this booking was paid for through the purchase top-up flow
    pub fn is_purchase(&self) -> bool {
        !self.used_credit && self.purchase_price.is_some_and(|price| price > Decimal::ZERO)
    }
}

/// Database request for inserting a registration. Rows are always inserted as active.
#[derive(Debug, Clone)]
pub struct RegistrationCreateDBRequest {
    pub user_id: UserId,
    pub class_id: ClassId,
    pub session_id: Option<SessionId>,
    pub session_class_id: Option<SessionClassId>,
    pub selected_date: Option<NaiveDate>,
    pub selected_time: Option<String>,
    pub slot_time: Option<String>,
    pub used_credit: bool,
    pub credit_type: Option<CreditGroup>,
    pub purchase_price: Option<Decimal>,
    pub terms_accepted: bool,
    pub health_declaration_accepted: bool,
    pub cancellation_policy_accepted: bool,
}

/// Status is the only field mutable after creation
#[derive(Debug, Clone)]
pub struct RegistrationUpdateDBRequest {
    pub status: RegistrationStatus,
}

impl RegistrationUpdateDBRequest {
    pub fn status(status: RegistrationStatus) -> Self {
        Self { status }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub user_id: Option<UserId>,
    pub class_id: Option<ClassId>,
    pub status: Option<RegistrationStatus>,
    /// Only bookings paid directly with credits
    pub used_credit: Option<bool>,
    pub skip: i64,
    pub limit: i64,
}

impl RegistrationFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn class_id(mut self, class_id: ClassId) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn status(mut self, status: RegistrationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn used_credit(mut self, used_credit: bool) -> Self {
        self.used_credit = Some(used_credit);
        self
    }
}
