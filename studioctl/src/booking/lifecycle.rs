//! Registration lifecycle manager.
//!
//! Drives the `active <-> cancelled` state machine and the ledger and trial movements that go with
//! every transition:
//!
//! | transition            | who          | side effects                                          |
//! |-----------------------|--------------|-------------------------------------------------------|
//! | create -> active      | member       | trial recorded, one credit deducted (direct or top-up) |
//! | active -> cancelled   | owner, admin | trial released, consumed credit refunded               |
//! | cancelled -> active   | admin        | I1 + capacity re-checked, trial re-recorded, credit re-deducted |
//! | delete                | owner, admin | none unless `compensate_on_delete`                     |
//!
//! Each operation runs in a single transaction. Any failure after the first write rolls the whole
//! transaction back, so a booking whose credit could not be taken leaves no row behind. Capacity
//! checks hold the per-occurrence advisory lock until commit, and the one-active-booking rule is
//! backed by a partial unique index, so concurrent requests cannot overbook or double book.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::{
    booking::{
        availability::{self, AvailabilityView, SlotAvailability},
        ledger::CreditLedger,
        slot,
        validation::{self, CreditTypeInfo, CreditValidation},
    },
    config::BookingConfig,
    db::{
        handlers::{Classes, Credits, Registrations, Repository, ScheduleSessions, TrialUsages},
        models::{
            classes::{Class, ClassCategory},
            credits::CreditGroup,
            registrations::{Registration, RegistrationCreateDBRequest, RegistrationFilter, RegistrationStatus, RegistrationUpdateDBRequest},
        },
    },
    errors::{Error, Result},
    types::{ClassId, CurrentUser, Operation, RegistrationId, Resource, SessionClassId, SessionId, UserId, abbrev_uuid},
};

/// A member's booking request. The booking is always made for the calling user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub class_id: ClassId,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub session_class_id: Option<SessionClassId>,
    #[serde(default)]
    pub selected_date: Option<NaiveDate>,
    /// `HH:MM` or a compound `HH:MM-HH:MM`
    #[serde(default)]
    pub selected_time: Option<String>,
    #[serde(default)]
    pub used_credit: bool,
    #[serde(default)]
    pub credit_type: Option<CreditGroup>,
    /// Amount already authorized by the payment provider
    #[serde(default)]
    pub purchase_price: Option<Decimal>,
    pub terms_accepted: bool,
    pub health_declaration_accepted: bool,
    pub cancellation_policy_accepted: bool,
}

/// Side-effect switches for admin status changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdateOptions {
    /// Refund the consumed credit when cancelling
    pub return_credit: bool,
    /// Take a credit again when reactivating
    pub deduct_credit: bool,
}

impl Default for StatusUpdateOptions {
    fn default() -> Self {
        Self {
            return_credit: true,
            deduct_credit: true,
        }
    }
}

#[derive(Clone, bon::Builder)]
pub struct RegistrationManager {
    db: PgPool,
    #[builder(default)]
    config: BookingConfig,
}

/// The credit group a registration consumed when it was booked, if any.
///
/// Direct bookings name it in `credit_type`. Purchase bookings consumed one credit of the group
/// their class category grants into, provided the class grants any.
fn consumed_credit_group(registration: &Registration, class: &Class) -> Option<CreditGroup> {
    if registration.used_credit {
        return registration.credit_type;
    }
    if registration.is_purchase() {
        return class
            .credits_per_purchase()
            .filter(|(_, amount)| *amount > 0)
            .map(|(group, _)| group);
    }
    None
}

fn forbidden(action: Operation) -> Error {
    Error::InsufficientPermissions {
        action,
        resource: Resource::Registrations,
    }
}

async fn rollback(tx: Transaction<'_, Postgres>, operation: &str) {
    if let Err(e) = tx.rollback().await {
        warn!(operation, error = %e, "Rollback failed");
    }
}

impl RegistrationManager {
    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    /// Ledger service sharing this manager's pool
    pub fn ledger(&self) -> CreditLedger {
        CreditLedger::new(self.db.clone())
    }

    /// Run `op` inside a transaction, committing on success and rolling back on any error.
    async fn in_transaction<T, F>(&self, operation: &str, op: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut PgConnection) -> futures::future::BoxFuture<'t, Result<T>>,
    {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
        match op(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(|e| Error::Database(e.into()))?;
                Ok(value)
            }
            Err(err) => {
                rollback(tx, operation).await;
                Err(err)
            }
        }
    }

    /// Book a class for the calling user.
    #[instrument(skip(self, actor, request), fields(user_id = %abbrev_uuid(&actor.id), class_id = %abbrev_uuid(&request.class_id)), err)]
    pub async fn create_registration(&self, actor: &CurrentUser, request: RegistrationRequest) -> Result<Registration> {
        if !(request.terms_accepted && request.health_declaration_accepted && request.cancellation_policy_accepted) {
            return Err(Error::bad_request(
                "Terms, health declaration and cancellation policy must all be accepted",
            ));
        }
        if request.purchase_price.is_some_and(|price| price < Decimal::ZERO) {
            return Err(Error::bad_request("Purchase price cannot be negative"));
        }
        let slot_time = request.selected_time.as_deref().map(slot::normalize).transpose()?;

        let user_id = actor.id;
        let registration = self
            .in_transaction("create registration", |conn| {
                Box::pin(Self::create_in_tx(conn, user_id, request, slot_time))
            })
            .await?;

        info!(registration_id = %abbrev_uuid(&registration.id), "Registration created");
        Ok(registration)
    }

    async fn create_in_tx(
        conn: &mut PgConnection,
        user_id: UserId,
        request: RegistrationRequest,
        slot_time: Option<String>,
    ) -> Result<Registration> {
        let class = Classes::new(conn)
            .get_by_id(request.class_id)
            .await?
            .ok_or_else(|| Error::not_found("Class", request.class_id))?;
        if !class.is_active {
            return Err(Error::bad_request(format!("Class '{}' is not open for booking", class.name)));
        }

        let session = match request.session_id {
            Some(session_id) => {
                let mut sessions = ScheduleSessions::new(conn);
                let session = sessions
                    .get_by_id(session_id)
                    .await?
                    .ok_or_else(|| Error::not_found("Session", session_id))?;

                if let Some(session_class_id) = request.session_class_id {
                    let link = sessions
                        .get_session_class(session_class_id)
                        .await?
                        .ok_or_else(|| Error::not_found("SessionClass", session_class_id))?;
                    if link.session_id != session.id || link.class_id != class.id {
                        return Err(Error::bad_request("Session class does not belong to the selected session and class"));
                    }
                }
                if let Some(date) = request.selected_date
                    && !session.weekdays.contains(&slot::weekday_index(date))
                {
                    return Err(Error::bad_request(format!("The selected session does not run on {date}")));
                }
                Some(session)
            }
            None => None,
        };

        if let Some(existing) = Registrations::new(conn)
            .find_active_duplicate(user_id, class.id, request.selected_date, slot_time.as_deref(), None)
            .await?
        {
            debug!(existing_id = %abbrev_uuid(&existing.id), "Duplicate active registration");
            return Err(Error::conflict("You already have an active registration for this class at this time"));
        }

        validation::validate_credit_usage(&class, request.used_credit, request.credit_type, None).into_result()?;
        let direct_credit = request.credit_type.filter(|_| request.used_credit);
        if let Some(group) = direct_credit
            && Credits::new(conn).list_positive(user_id, group).await?.is_empty()
        {
            return Err(Error::InsufficientCredit { credit_group: group });
        }

        if let (Some(session), Some(date), Some(slot_time)) = (&session, request.selected_date, slot_time.as_deref()) {
            Registrations::new(conn).lock_occurrence(session.id, date, slot_time).await?;
            let view = availability::occurrence_availability(conn, session, date, slot_time).await?;
            if view.is_full() {
                return Err(Error::CapacityExceeded {
                    session_id: session.id,
                    date,
                    time: slot_time.to_string(),
                    max_capacity: view.max_capacity,
                });
            }
        }

        // Trial lock after the slot lock, the same order reactivation takes them in
        let is_trial = class.category == ClassCategory::Trial;
        if is_trial {
            let mut trials = TrialUsages::new(conn);
            trials.lock_pair(user_id, class.id).await?;
            if trials.has_used(user_id, class.id).await? {
                return Err(Error::conflict("The trial for this class has already been used"));
            }
        }

        let registration = Registrations::new(conn)
            .create(&RegistrationCreateDBRequest {
                user_id,
                class_id: class.id,
                session_id: request.session_id,
                session_class_id: request.session_class_id,
                selected_date: request.selected_date,
                selected_time: request.selected_time,
                slot_time,
                used_credit: request.used_credit,
                credit_type: request.credit_type,
                purchase_price: request.purchase_price,
                terms_accepted: request.terms_accepted,
                health_declaration_accepted: request.health_declaration_accepted,
                cancellation_policy_accepted: request.cancellation_policy_accepted,
            })
            .await?;

        if is_trial {
            TrialUsages::new(conn).record(user_id, class.id).await?;
        }

        let mut credits = Credits::new(conn);
        if let Some(group) = direct_credit {
            if credits.deduct_one(user_id, group).await?.is_none() {
                return Err(Error::InsufficientCredit { credit_group: group });
            }
            debug!(group = %group, "Deducted credit for booking");
        } else if registration.is_purchase()
            && let Some((group, amount)) = class.credits_per_purchase().filter(|(_, amount)| *amount > 0)
        {
            let topped_up = credits.add(user_id, group, amount, None, false).await?;
            debug!(group = %group, amount, credit_id = %abbrev_uuid(&topped_up.id), "Topped up credits from purchase");
            if credits.deduct_one(user_id, group).await?.is_none() {
                return Err(Error::InsufficientCredit { credit_group: group });
            }
        }

        Ok(registration)
    }

    /// Cancel an active registration, as its owner or an admin.
    ///
    /// Rejected once the class starts within the configured cancellation window.
    #[instrument(skip(self, actor), fields(registration_id = %abbrev_uuid(&id), actor_id = %abbrev_uuid(&actor.id)), err)]
    pub async fn cancel_registration(&self, actor: &CurrentUser, id: RegistrationId) -> Result<Registration> {
        let actor = actor.clone();
        let config = self.config.clone();
        let registration = self
            .in_transaction("cancel registration", |conn| {
                Box::pin(async move {
                    let registration = Registrations::new(conn)
                        .get_for_update(id)
                        .await?
                        .ok_or_else(|| Error::not_found("Registration", id))?;
                    if !actor.can_access(registration.user_id) {
                        return Err(forbidden(Operation::UpdateOwn));
                    }
                    match registration.status {
                        RegistrationStatus::Active => {}
                        RegistrationStatus::Cancelled => return Err(Error::bad_request("Registration is already cancelled")),
                        RegistrationStatus::Pending => return Err(Error::bad_request("Only active registrations can be cancelled")),
                    }
                    Self::ensure_cancellable(&config, &registration)?;

                    let class = Self::class_of(conn, &registration).await?;
                    Self::release_booking(conn, &registration, &class, true).await?;

                    Ok(Registrations::new(conn)
                        .update(id, &RegistrationUpdateDBRequest::status(RegistrationStatus::Cancelled))
                        .await?)
                })
            })
            .await?;

        info!("Registration cancelled");
        Ok(registration)
    }

    fn ensure_cancellable(config: &BookingConfig, registration: &Registration) -> Result<()> {
        let Some(date) = registration.selected_date else {
            return Ok(());
        };
        let time = registration.selected_time.as_deref().unwrap_or("00:00");
        let starts_at = slot::class_start(date, time, config.utc_offset_minutes)?;
        let window = chrono::Duration::from_std(config.cancellation_window).map_err(|e| Error::Other(e.into()))?;

        if Utc::now() + window > starts_at {
            let hours = config.cancellation_window.as_secs() / 3600;
            return Err(Error::bad_request(format!(
                "Too late to cancel: registrations can only be cancelled up to {hours} hours before the class starts"
            )));
        }
        Ok(())
    }

    async fn class_of(conn: &mut PgConnection, registration: &Registration) -> Result<Class> {
        Classes::new(conn)
            .get_by_id(registration.class_id)
            .await?
            .ok_or_else(|| Error::not_found("Class", registration.class_id))
    }

    /// Undo the entitlements an active booking holds: release the trial and refund the credit.
    async fn release_booking(conn: &mut PgConnection, registration: &Registration, class: &Class, return_credit: bool) -> Result<()> {
        if class.category == ClassCategory::Trial {
            TrialUsages::new(conn).release(registration.user_id, class.id).await?;
        }
        if return_credit && let Some(group) = consumed_credit_group(registration, class) {
            Credits::new(conn).add(registration.user_id, group, 1, None, false).await?;
            debug!(group = %group, "Refunded credit");
        }
        Ok(())
    }

    /// Admin status change between active and cancelled, bypassing the cancellation window.
    #[instrument(skip(self, actor), fields(registration_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn update_registration_status(
        &self,
        actor: &CurrentUser,
        id: RegistrationId,
        status: RegistrationStatus,
        options: StatusUpdateOptions,
    ) -> Result<Registration> {
        if !actor.is_admin() {
            return Err(forbidden(Operation::UpdateAll));
        }
        if status == RegistrationStatus::Pending {
            return Err(Error::bad_request("Registrations can only be set to active or cancelled"));
        }

        let strict = self.config.strict_reactivation_deduction;
        self.in_transaction("update registration status", |conn| {
            Box::pin(
                async move {
                    let registration = Registrations::new(conn)
                        .get_for_update(id)
                        .await?
                        .ok_or_else(|| Error::not_found("Registration", id))?;
                    if registration.status == status {
                        return Ok(registration);
                    }

                    let class = Self::class_of(conn, &registration).await?;
                    match status {
                        RegistrationStatus::Cancelled => {
                            if registration.is_active() {
                                Self::release_booking(conn, &registration, &class, options.return_credit).await?;
                            }
                        }
                        RegistrationStatus::Active => {
                            Self::reacquire_booking(conn, &registration, &class, options.deduct_credit, strict).await?;
                        }
                        RegistrationStatus::Pending => {
                            return Err(Error::bad_request("Registrations can only be set to active or cancelled"));
                        }
                    }

                    let updated = Registrations::new(conn)
                        .update(id, &RegistrationUpdateDBRequest::status(status))
                        .await?;
                    info!(from = %registration.status, to = %status, "Registration status updated");
                    Ok(updated)
                }
                .instrument(info_span!("status_transition", registration_id = %abbrev_uuid(&id))),
            )
        })
        .await
    }

    /// Re-take the slot, trial and credit a registration gave up when it was cancelled.
    async fn reacquire_booking(
        conn: &mut PgConnection,
        registration: &Registration,
        class: &Class,
        deduct_credit: bool,
        strict: bool,
    ) -> Result<()> {
        let user_id = registration.user_id;

        if Registrations::new(conn)
            .find_active_duplicate(
                user_id,
                class.id,
                registration.selected_date,
                registration.slot_time.as_deref(),
                Some(registration.id),
            )
            .await?
            .is_some()
        {
            return Err(Error::conflict(
                "Another active registration exists for this user, class and time",
            ));
        }

        if let (Some(session_id), Some(date), Some(slot_time)) =
            (registration.session_id, registration.selected_date, registration.slot_time.as_deref())
        {
            Registrations::new(conn).lock_occurrence(session_id, date, slot_time).await?;
            let session = ScheduleSessions::new(conn)
                .get_by_id(session_id)
                .await?
                .ok_or_else(|| Error::not_found("Session", session_id))?;
            let view = availability::occurrence_availability(conn, &session, date, slot_time).await?;
            if view.is_full() {
                return Err(Error::CapacityExceeded {
                    session_id,
                    date,
                    time: slot_time.to_string(),
                    max_capacity: view.max_capacity,
                });
            }
        }

        if class.category == ClassCategory::Trial {
            let mut trials = TrialUsages::new(conn);
            trials.lock_pair(user_id, class.id).await?;
            if trials.has_used(user_id, class.id).await? {
                return Err(Error::conflict("The trial for this class has already been used"));
            }
            trials.record(user_id, class.id).await?;
        }

        if deduct_credit && let Some(group) = consumed_credit_group(registration, class) {
            if Credits::new(conn).deduct_one(user_id, group).await?.is_none() {
                if strict {
                    return Err(Error::InsufficientCredit { credit_group: group });
                }
                warn!(
                    user_id = %abbrev_uuid(&user_id),
                    group = %group,
                    "No credit left to re-deduct on reactivation; registration reactivated without payment"
                );
            } else {
                debug!(group = %group, "Re-deducted credit on reactivation");
            }
        }

        Ok(())
    }

    /// Hard delete a registration, as its owner or an admin.
    ///
    /// Credits and trials are only given back when `compensate_on_delete` is set.
    #[instrument(skip(self, actor), fields(registration_id = %abbrev_uuid(&id), actor_id = %abbrev_uuid(&actor.id)), err)]
    pub async fn delete_registration(&self, actor: &CurrentUser, id: RegistrationId) -> Result<()> {
        let actor = actor.clone();
        let compensate = self.config.compensate_on_delete;
        self.in_transaction("delete registration", |conn| {
            Box::pin(async move {
                let registration = Registrations::new(conn)
                    .get_for_update(id)
                    .await?
                    .ok_or_else(|| Error::not_found("Registration", id))?;
                if !actor.can_access(registration.user_id) {
                    return Err(forbidden(Operation::DeleteOwn));
                }

                if compensate && registration.is_active() {
                    let class = Self::class_of(conn, &registration).await?;
                    Self::release_booking(conn, &registration, &class, true).await?;
                }

                Registrations::new(conn).delete(id).await?;
                Ok(())
            })
        })
        .await?;

        info!("Registration deleted");
        Ok(())
    }

    #[instrument(skip(self, actor), fields(registration_id = %abbrev_uuid(&id)), err)]
    pub async fn get_registration(&self, actor: &CurrentUser, id: RegistrationId) -> Result<Registration> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let registration = Registrations::new(&mut conn)
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("Registration", id))?;
        if !actor.can_access(registration.user_id) {
            return Err(forbidden(Operation::ReadOwn));
        }
        Ok(registration)
    }

    /// Registrations of a user, newest first
    #[instrument(skip(self, actor), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_user_registrations(&self, actor: &CurrentUser, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<Registration>> {
        if !actor.can_access(user_id) {
            return Err(forbidden(Operation::ReadOwn));
        }
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Registrations::new(&mut conn)
            .list(&RegistrationFilter::new(skip, limit).user_id(user_id))
            .await?)
    }

    /// Dry-run the credit rules for a class, optionally against a user's current balance
    #[instrument(skip(self), fields(class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn validate_class_registration(
        &self,
        class_id: ClassId,
        used_credit: bool,
        credit_type: Option<CreditGroup>,
        user_id: Option<UserId>,
    ) -> Result<CreditValidation> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let class = Classes::new(&mut conn)
            .get_by_id(class_id)
            .await?
            .ok_or_else(|| Error::not_found("Class", class_id))?;

        let snapshot = match user_id {
            Some(user_id) => Some(Credits::new(&mut conn).list_user_credits(user_id).await?),
            None => None,
        };

        Ok(validation::validate_credit_usage(&class, used_credit, credit_type, snapshot.as_deref()))
    }

    #[instrument(skip(self), fields(class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn get_available_credit_types(&self, class_id: ClassId) -> Result<Vec<CreditTypeInfo>> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let class = Classes::new(&mut conn)
            .get_by_id(class_id)
            .await?
            .ok_or_else(|| Error::not_found("Class", class_id))?;

        Ok(validation::available_credit_types(&class))
    }

    pub async fn check_availability(&self, session_id: SessionId, date: NaiveDate, time: &str) -> Result<AvailabilityView> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        availability::check_availability(&mut conn, session_id, date, time).await
    }

    pub async fn check_date_availability(&self, date: NaiveDate) -> Result<Vec<SlotAvailability>> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        availability::check_date_availability(&mut conn, date).await
    }
}
