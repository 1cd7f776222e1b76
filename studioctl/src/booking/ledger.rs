//! Credit ledger manager.
//!
//! User-facing ledger operations plus the admin surface. Every mutation runs in its own
//! transaction so the `(user, group)` bucket lock in [`Credits`] actually serialises writers.
//! Running out of credits is reported as `Ok(false)` from [`CreditLedger::deduct_credit`], never
//! as an error.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::{
    db::{
        handlers::{Credits, Registrations},
        models::{
            credits::{CreditCheck, CreditGroup, CreditHistory, CreditStatistics, CreditUpdateDBRequest, SubscriptionCredit},
        },
    },
    errors::{Error, Result},
    types::{CreditId, CurrentUser, Operation, Resource, UserId, abbrev_uuid},
};

#[derive(Clone)]
pub struct CreditLedger {
    db: PgPool,
}

fn require_admin(actor: &CurrentUser, action: Operation) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            action,
            resource: Resource::Credits,
        })
    }
}

fn require_access(actor: &CurrentUser, owner: UserId, action: Operation) -> Result<()> {
    if actor.can_access(owner) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            action,
            resource: Resource::Credits,
        })
    }
}

impl CreditLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Take one credit from the oldest positive row. Returns `false` if there was nothing to take.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn deduct_credit(&self, user_id: UserId, group: CreditGroup) -> Result<bool> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
        let deducted = Credits::new(&mut tx).deduct_one(user_id, group).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        Ok(deducted.is_some())
    }

    /// Return one credit to the oldest row of the group, creating a row if the user has none.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn add_credit(&self, user_id: UserId, group: CreditGroup) -> Result<bool> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
        Credits::new(&mut tx).add(user_id, group, 1, None, false).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        Ok(true)
    }

    /// Grant `amount` credits. An existing row takes the new expiry, even when it is `None`.
    #[instrument(skip(self, actor), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn add_credits_to_user(
        &self,
        actor: &CurrentUser,
        user_id: UserId,
        group: CreditGroup,
        amount: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionCredit> {
        require_admin(actor, Operation::UpdateAll)?;
        if amount <= 0 {
            return Err(Error::bad_request("Credit amount must be positive"));
        }

        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
        let row = Credits::new(&mut tx).add(user_id, group, amount, expires_at, true).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        info!(credit_id = %abbrev_uuid(&row.id), remaining = row.remaining_credits, "Granted credits");
        Ok(row)
    }

    /// All ledger rows of a user, oldest first
    #[instrument(skip(self, actor), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_user_credits(&self, actor: &CurrentUser, user_id: UserId) -> Result<Vec<SubscriptionCredit>> {
        require_access(actor, user_id, Operation::ReadOwn)?;
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Credits::new(&mut conn).list_user_credits(user_id).await?)
    }

    /// Positive balance of one group, summed across rows
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group = %group), err)]
    pub async fn check_user_credits(&self, user_id: UserId, group: CreditGroup) -> Result<CreditCheck> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let credits = Credits::new(&mut conn).list_positive(user_id, group).await?;
        let total_credits: i64 = credits.iter().map(|credit| i64::from(credit.remaining_credits)).sum();

        Ok(CreditCheck {
            has_credits: total_credits > 0,
            total_credits,
            credits,
        })
    }

    /// Overwrite one row; the row must belong to `user_id`.
    #[instrument(skip(self, actor, request), fields(credit_id = %abbrev_uuid(&credit_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn update_user_credits(
        &self,
        actor: &CurrentUser,
        credit_id: CreditId,
        user_id: UserId,
        request: &CreditUpdateDBRequest,
    ) -> Result<SubscriptionCredit> {
        require_admin(actor, Operation::UpdateAll)?;
        if request.remaining_credits < 0 {
            return Err(Error::bad_request("Remaining credits cannot be negative"));
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Credits::new(&mut conn)
            .update_for_user(credit_id, user_id, request)
            .await?
            .ok_or_else(|| Error::not_found("Credit", credit_id))
    }

    #[instrument(skip(self, actor), fields(credit_id = %abbrev_uuid(&credit_id)), err)]
    pub async fn delete_user_credits(&self, actor: &CurrentUser, credit_id: CreditId) -> Result<()> {
        require_admin(actor, Operation::DeleteAll)?;

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        if !Credits::new(&mut conn).delete(credit_id).await? {
            return Err(Error::not_found("Credit", credit_id));
        }

        info!("Deleted credit row");
        Ok(())
    }

    #[instrument(skip(self, actor), err)]
    pub async fn get_credit_statistics(&self, actor: &CurrentUser) -> Result<CreditStatistics> {
        require_admin(actor, Operation::ReadAll)?;
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Credits::new(&mut conn).statistics().await?)
    }

    /// Ledger rows plus every booking the user paid for directly with credits
    #[instrument(skip(self, actor), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_user_credit_history(&self, actor: &CurrentUser, user_id: UserId) -> Result<CreditHistory> {
        require_admin(actor, Operation::ReadAll)?;

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let credits = Credits::new(&mut conn).list_user_credits(user_id).await?;
        let registrations = Registrations::new(&mut conn).list_credit_paid(user_id).await?;

        Ok(CreditHistory { credits, registrations })
    }
}
