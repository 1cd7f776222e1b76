//! Database model for one-time trial entitlements.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{ClassId, UserId};

/// Marks that `user_id` has consumed the trial entitlement for `class_id`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrialUsage {
    pub id: Uuid,
    pub user_id: UserId,
    pub class_id: ClassId,
    pub used_at: DateTime<Utc>,
}
