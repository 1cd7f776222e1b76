//! Database models for recurring schedule sessions and their class links.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{ClassId, SessionClassId, SessionId};

/// A recurring time slot. A concrete occurrence is (session, date, time-of-day).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduleSession {
    pub id: SessionId,
    /// 0 = Sunday ... 6 = Saturday
    pub weekdays: Vec<i16>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ScheduleSessionCreateDBRequest {
    pub weekdays: Vec<i16>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleSessionUpdateDBRequest {
    pub max_capacity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleSessionFilter {
    pub active_only: bool,
    /// Only sessions that recur on this weekday (0 = Sunday)
    pub weekday: Option<i16>,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionClass {
    pub id: SessionClassId,
    pub session_id: SessionId,
    pub class_id: ClassId,
    /// Occurrence-specific price
    pub price: Decimal,
    pub is_trial: bool,
    pub max_uses_per_user: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionClassCreateDBRequest {
    pub session_id: SessionId,
    pub class_id: ClassId,
    pub price: Decimal,
    pub is_trial: bool,
    pub max_uses_per_user: Option<i32>,
}

/// Joined view of an active session/class pairing, used by the per-date schedule
#[derive(Debug, Clone, FromRow)]
pub struct ScheduledClass {
    pub session_id: SessionId,
    pub session_class_id: SessionClassId,
    pub class_id: ClassId,
    pub class_name: String,
    pub weekdays: Vec<i16>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: i32,
}
