//! Database repository for the prepaid credit ledger.
//!
//! A user may hold several rows per credit group, one per grant. Consumption always draws from
//! the oldest row that still has a positive balance; top-ups always land on the oldest row of
//! the group, or create the first one.
//!
//! Every mutation first takes a transaction-scoped advisory lock on the `(user, group)` bucket,
//! so concurrent bookings for the same user queue up instead of racing on the FIFO choice.
//! Mutations are only isolated when the repository is built from a transaction.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::credits::{CreditGroup, CreditStatistics, CreditUpdateDBRequest, SubscriptionCredit},
    },
    types::{CreditId, UserId, abbrev_uuid},
};

const CREDIT_COLUMNS: &str = "id, user_id, credit_group, remaining_credits, expires_at, created_at, updated_at";

pub struct Credits<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Credits<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    async fn lock_bucket(&mut self, user_id: UserId, group: CreditGroup) -> Result<()> {
        let key = format!("credits:{user_id}:{group}");
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// All ledger rows for a user, oldest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_user_credits(&mut self, user_id: UserId) -> Result<Vec<SubscriptionCredit>> {
        let credits = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            "SELECT {CREDIT_COLUMNS} FROM subscription_credits WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(credits)
    }

    /// Rows of one group that still have a positive balance, oldest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn list_positive(&mut self, user_id: UserId, group: CreditGroup) -> Result<Vec<SubscriptionCredit>> {
        let credits = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            r#"
            SELECT {CREDIT_COLUMNS}
            FROM subscription_credits
            WHERE user_id = $1 AND credit_group = $2 AND remaining_credits > 0
            ORDER BY created_at, id
            "#
        ))
        .bind(user_id)
        .bind(group)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(credits)
    }

    /// Take one credit from the oldest positive row of the group.
    ///
    /// Returns `None` when no row has a positive balance; nothing is written in that case.
    /// The decrement is a single conditional UPDATE, so the balance can never go negative.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn deduct_one(&mut self, user_id: UserId, group: CreditGroup) -> Result<Option<SubscriptionCredit>> {
        self.lock_bucket(user_id, group).await?;

        let row = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            r#"
            UPDATE subscription_credits
            SET remaining_credits = remaining_credits - 1, updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM subscription_credits
                WHERE user_id = $1 AND credit_group = $2 AND remaining_credits > 0
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE
            )
            AND remaining_credits > 0
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(group)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// Add `amount` credits to the oldest row of the group, or create the first row.
    ///
    /// When `overwrite_expiry` is set, an existing row's `expires_at` is replaced with `expires_at`
    /// (last write wins); otherwise the existing expiry is kept.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn add(
        &mut self,
        user_id: UserId,
        group: CreditGroup,
        amount: i32,
        expires_at: Option<DateTime<Utc>>,
        overwrite_expiry: bool,
    ) -> Result<SubscriptionCredit> {
        self.lock_bucket(user_id, group).await?;

        let updated = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            r#"
            UPDATE subscription_credits
            SET remaining_credits = remaining_credits + $3,
                expires_at = CASE WHEN $5 THEN $4 ELSE expires_at END,
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM subscription_credits
                WHERE user_id = $1 AND credit_group = $2
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE
            )
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(group)
        .bind(amount)
        .bind(expires_at)
        .bind(overwrite_expiry)
        .fetch_optional(&mut *self.db)
        .await?;

        if let Some(row) = updated {
            return Ok(row);
        }

        let created = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            r#"
            INSERT INTO subscription_credits (user_id, credit_group, remaining_credits, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(group)
        .bind(amount)
        .bind(expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(created)
    }

    /// Insert a separate grant row, leaving existing rows untouched
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn insert_grant(
        &mut self,
        user_id: UserId,
        group: CreditGroup,
        amount: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionCredit> {
        self.lock_bucket(user_id, group).await?;

        let created = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            r#"
            INSERT INTO subscription_credits (user_id, credit_group, remaining_credits, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(group)
        .bind(amount)
        .bind(expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self), fields(credit_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: CreditId) -> Result<Option<SubscriptionCredit>> {
        let credit = sqlx::query_as::<_, SubscriptionCredit>(&format!("SELECT {CREDIT_COLUMNS} FROM subscription_credits WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(credit)
    }

    /// Overwrite one row, scoped to its owner. Returns `None` if the row does not belong to `user_id`.
    #[instrument(skip(self, request), fields(credit_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn update_for_user(
        &mut self,
        id: CreditId,
        user_id: UserId,
        request: &CreditUpdateDBRequest,
    ) -> Result<Option<SubscriptionCredit>> {
        let credit = sqlx::query_as::<_, SubscriptionCredit>(&format!(
            r#"
            UPDATE subscription_credits
            SET remaining_credits = $3, expires_at = $4, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(request.remaining_credits)
        .bind(request.expires_at)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(credit)
    }

    #[instrument(skip(self), fields(credit_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: CreditId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscription_credits WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    pub async fn statistics(&mut self) -> Result<CreditStatistics> {
        let stats = sqlx::query_as::<_, CreditStatistics>(
            r#"
            SELECT COALESCE(SUM(remaining_credits), 0)::BIGINT AS total_credits,
                   COALESCE(SUM(remaining_credits) FILTER (WHERE credit_group = 'group'), 0)::BIGINT AS group_credits,
                   COALESCE(SUM(remaining_credits) FILTER (WHERE credit_group = 'private'), 0)::BIGINT AS private_credits,
                   COUNT(DISTINCT user_id) AS users_with_credits,
                   COUNT(*) AS total_rows
            FROM subscription_credits
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(stats)
    }
}
