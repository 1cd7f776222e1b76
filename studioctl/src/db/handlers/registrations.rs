//! Database repository for class registrations.
//!
//! Besides plain CRUD this repository owns the two store-level guards the booking flow relies
//! on: the per-occurrence advisory lock that serialises capacity check-then-insert, and the
//! partial unique index `registrations_active_slot_unique` that backs the one-active-booking
//! rule. Both only hold inside a transaction, so callers should build this repository from one.

use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::registrations::{
            Registration, RegistrationCreateDBRequest, RegistrationFilter, RegistrationUpdateDBRequest,
        },
    },
    types::{ClassId, RegistrationId, SessionId, UserId, abbrev_uuid},
};

const REGISTRATION_COLUMNS: &str = "id, user_id, class_id, session_id, session_class_id, selected_date, selected_time, slot_time, \
     status, used_credit, credit_type, purchase_price, terms_accepted, health_declaration_accepted, \
     cancellation_policy_accepted, created_at, updated_at";

pub struct Registrations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Registrations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Take a transaction-scoped advisory lock on one occurrence (session, date, slot).
    ///
    /// Released automatically on commit or rollback. Concurrent bookings for the same occurrence
    /// queue here; bookings for other occurrences are unaffected.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&session_id)), err)]
    pub async fn lock_occurrence(&mut self, session_id: SessionId, date: NaiveDate, slot_time: &str) -> Result<()> {
        let key = format!("slot:{session_id}:{date}:{slot_time}");
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Number of active registrations for one occurrence
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&session_id)), err)]
    pub async fn count_active_for_occurrence(&mut self, session_id: SessionId, date: NaiveDate, slot_time: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM registrations
            WHERE session_id = $1
              AND selected_date = $2
              AND slot_time = $3
              AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(date)
        .bind(slot_time)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }

    /// Find another active registration for the same user/class/date/slot.
    ///
    /// A missing date or slot only matches a missing date or slot. `exclude` skips one row, which
    /// lets a cancelled registration check for duplicates before it is reactivated.
    #[instrument(skip(self, date, slot_time), fields(user_id = %abbrev_uuid(&user_id), class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn find_active_duplicate(
        &mut self,
        user_id: UserId,
        class_id: ClassId,
        date: Option<NaiveDate>,
        slot_time: Option<&str>,
        exclude: Option<RegistrationId>,
    ) -> Result<Option<Registration>> {
        let existing = sqlx::query_as::<_, Registration>(&format!(
            r#"
            SELECT {REGISTRATION_COLUMNS}
            FROM registrations
            WHERE user_id = $1
              AND class_id = $2
              AND selected_date IS NOT DISTINCT FROM $3
              AND slot_time IS NOT DISTINCT FROM $4
              AND status = 'active'
              AND ($5::UUID IS NULL OR id <> $5)
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(class_id)
        .bind(date)
        .bind(slot_time)
        .bind(exclude)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(existing)
    }

    /// Fetch a registration and hold its row lock until the surrounding transaction ends
    #[instrument(skip(self), fields(registration_id = %abbrev_uuid(&id)), err)]
    pub async fn get_for_update(&mut self, id: RegistrationId) -> Result<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(&format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(registration)
    }

    /// Every booking a user paid for directly with credits, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_credit_paid(&mut self, user_id: UserId) -> Result<Vec<Registration>> {
        let registrations = sqlx::query_as::<_, Registration>(&format!(
            r#"
            SELECT {REGISTRATION_COLUMNS}
            FROM registrations
            WHERE user_id = $1 AND used_credit = TRUE
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(registrations)
    }

    /// Hard delete. Returns whether a row was removed.
    #[instrument(skip(self), fields(registration_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: RegistrationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM registrations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Registrations<'c> {
    type CreateRequest = RegistrationCreateDBRequest;
    type UpdateRequest = RegistrationUpdateDBRequest;
    type Response = Registration;
    type Id = RegistrationId;
    type Filter = RegistrationFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), class_id = %abbrev_uuid(&request.class_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            r#"
            INSERT INTO registrations (
                user_id, class_id, session_id, session_class_id, selected_date, selected_time, slot_time,
                status, used_credit, credit_type, purchase_price,
                terms_accepted, health_declaration_accepted, cancellation_policy_accepted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $9, $10, $11, $12, $13)
            RETURNING {REGISTRATION_COLUMNS}
            "#
        ))
        .bind(request.user_id)
        .bind(request.class_id)
        .bind(request.session_id)
        .bind(request.session_class_id)
        .bind(request.selected_date)
        .bind(request.selected_time.as_deref())
        .bind(request.slot_time.as_deref())
        .bind(request.used_credit)
        .bind(request.credit_type)
        .bind(request.purchase_price)
        .bind(request.terms_accepted)
        .bind(request.health_declaration_accepted)
        .bind(request.cancellation_policy_accepted)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(registration)
    }

    #[instrument(skip(self), fields(registration_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let registration = sqlx::query_as::<_, Registration>(&format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(registration)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE 1=1");
        let mut conditions = Vec::new();

        if filter.user_id.is_some() {
            conditions.push(format!("user_id = ${}", conditions.len() + 1));
        }
        if filter.class_id.is_some() {
            conditions.push(format!("class_id = ${}", conditions.len() + 1));
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${}", conditions.len() + 1));
        }
        if filter.used_credit.is_some() {
            conditions.push(format!("used_credit = ${}", conditions.len() + 1));
        }

        if !conditions.is_empty() {
            query.push_str(" AND ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
            filter.limit, filter.skip
        ));

        let mut sql_query = sqlx::query_as::<_, Registration>(&query);

        if let Some(user_id) = filter.user_id {
            sql_query = sql_query.bind(user_id);
        }
        if let Some(class_id) = filter.class_id {
            sql_query = sql_query.bind(class_id);
        }
        if let Some(status) = filter.status {
            sql_query = sql_query.bind(status);
        }
        if let Some(used_credit) = filter.used_credit {
            sql_query = sql_query.bind(used_credit);
        }

        let registrations = sql_query.fetch_all(&mut *self.db).await?;
        Ok(registrations)
    }

    #[instrument(skip(self, request), fields(registration_id = %abbrev_uuid(&id), status = %request.status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            r#"
            UPDATE registrations
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {REGISTRATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.status)
        .fetch_optional(&mut *self.db)
        .await?;

        registration.ok_or(DbError::NotFound)
    }
}
