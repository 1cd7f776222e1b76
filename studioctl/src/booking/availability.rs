//! Availability engine: remaining capacity per class occurrence.
//!
//! All functions are read-only and take a plain connection, so the lifecycle manager can run them
//! inside its own transaction after taking the occurrence lock.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    booking::slot,
    db::{
        handlers::{Registrations, Repository, ScheduleSessions},
        models::sessions::ScheduleSession,
    },
    errors::{Error, Result},
    types::{ClassId, SessionClassId, SessionId, abbrev_uuid},
};

/// Capacity snapshot for one occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityView {
    pub taken_spots: i64,
    pub max_capacity: i32,
    /// Negative when the occurrence is overbooked; anything <= 0 is full
    pub available_spots: i64,
    pub message: String,
}

impl AvailabilityView {
    pub fn new(taken_spots: i64, max_capacity: i32) -> Self {
        let available_spots = i64::from(max_capacity) - taken_spots;
        Self {
            taken_spots,
            max_capacity,
            available_spots,
            message: capacity_message(available_spots),
        }
    }

    pub fn is_full(&self) -> bool {
        self.available_spots <= 0
    }
}

/// One class offered in a time slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledClassRef {
    pub class_id: ClassId,
    pub session_class_id: SessionClassId,
    pub class_name: String,
}

/// Availability of one time slot on a given date
#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    /// `HH:MM-HH:MM`
    pub time: String,
    pub session_id: SessionId,
    pub classes: Vec<ScheduledClassRef>,
    #[serde(flatten)]
    pub availability: AvailabilityView,
}

/// Human label for a number of free spots
pub fn capacity_message(available_spots: i64) -> String {
    match available_spots {
        n if n <= 0 => "Class is full".to_string(),
        1 => "Last spot available!".to_string(),
        n @ 2..=3 => format!("{n} spots available"),
        _ => "Available".to_string(),
    }
}

/// Capacity of an already loaded session for one occurrence
pub async fn occurrence_availability(
    conn: &mut PgConnection,
    session: &ScheduleSession,
    date: NaiveDate,
    slot_time: &str,
) -> Result<AvailabilityView> {
    let taken = Registrations::new(conn)
        .count_active_for_occurrence(session.id, date, slot_time)
        .await?;
    Ok(AvailabilityView::new(taken, session.max_capacity))
}

/// Remaining capacity for (session, date, time).
///
/// Capacity is read even from inactive sessions. `time` may be a compound range; only its start
/// component identifies the occurrence.
#[instrument(skip(conn), fields(session_id = %abbrev_uuid(&session_id)), err)]
pub async fn check_availability(conn: &mut PgConnection, session_id: SessionId, date: NaiveDate, time: &str) -> Result<AvailabilityView> {
    let slot_time = slot::normalize(time)?;
    let session = ScheduleSessions::new(conn)
        .get_by_id(session_id)
        .await?
        .ok_or_else(|| Error::not_found("Session", session_id))?;

    occurrence_availability(conn, &session, date, &slot_time).await
}

/// Availability of every scheduled time slot on a date, sorted by time.
///
/// Sessions and classes must both be active and the session must recur on the date's weekday.
///
/// First session wins: when several sessions share the same time range, the one with the lowest
/// id represents the slot, and its capacity and classes are the ones reported. Classes linked only
/// to the other sessions in that range are left out of the listing.
#[instrument(skip(conn), err)]
pub async fn check_date_availability(conn: &mut PgConnection, date: NaiveDate) -> Result<Vec<SlotAvailability>> {
    let scheduled = ScheduleSessions::new(conn)
        .list_scheduled_for_weekday(slot::weekday_index(date))
        .await?;

    let mut slots: BTreeMap<String, (ScheduleSession, Vec<ScheduledClassRef>)> = BTreeMap::new();
    let mut sessions = ScheduleSessions::new(conn);
    for entry in scheduled {
        let time = slot::format_range(entry.start_time, entry.end_time);
        let class_ref = ScheduledClassRef {
            class_id: entry.class_id,
            session_class_id: entry.session_class_id,
            class_name: entry.class_name,
        };

        match slots.get_mut(&time) {
            Some((session, classes)) => {
                if session.id == entry.session_id {
                    classes.push(class_ref);
                }
            }
            None => {
                let Some(session) = sessions.get_by_id(entry.session_id).await? else {
                    continue;
                };
                slots.insert(time, (session, vec![class_ref]));
            }
        }
    }

    let mut result = Vec::with_capacity(slots.len());
    for (time, (session, classes)) in slots {
        let slot_time = slot::normalize(&time)?;
        let availability = occurrence_availability(conn, &session, date, &slot_time).await?;
        result.push(SlotAvailability {
            time,
            session_id: session.id,
            classes,
            availability,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::classes::ClassCategory;
    use crate::db::models::registrations::{RegistrationStatus, RegistrationUpdateDBRequest};
    use crate::errors::ErrorKind;
    use crate::test::utils::{create_test_class, create_test_session, link_class_to_session, registration_request};
    use sqlx::PgPool;
    use uuid::Uuid;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
    }

    #[test]
    fn test_capacity_message_tiers() {
        assert_eq!(capacity_message(-2), "Class is full");
        assert_eq!(capacity_message(0), "Class is full");
        assert_eq!(capacity_message(1), "Last spot available!");
        assert_eq!(capacity_message(2), "2 spots available");
        assert_eq!(capacity_message(3), "3 spots available");
        assert_eq!(capacity_message(4), "Available");
    }

    #[test]
    fn test_overbooked_view_is_negative_and_full() {
        let view = AvailabilityView::new(7, 5);
        assert_eq!(view.available_spots, -2);
        assert!(view.is_full());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_availability_counts_active_registrations(pool: PgPool) {
        let class = create_test_class(&pool, ClassCategory::Subscription, 8, 0).await;
        let session = create_test_session(&pool, &[1], "09:00", "10:00", 3).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Registrations::new(&mut conn);
        repo.create(&registration_request(Uuid::new_v4(), class.id, Some(session.id), Some(monday()), Some("09:00-10:00")))
            .await
            .unwrap();
        let cancelled = repo
            .create(&registration_request(Uuid::new_v4(), class.id, Some(session.id), Some(monday()), Some("09:00")))
            .await
            .unwrap();
        repo.update(cancelled.id, &RegistrationUpdateDBRequest::status(RegistrationStatus::Cancelled))
            .await
            .unwrap();

        let view = check_availability(&mut conn, session.id, monday(), "09:00-10:00").await.unwrap();
        assert_eq!(view.taken_spots, 1);
        assert_eq!(view.max_capacity, 3);
        assert_eq!(view.available_spots, 2);
        assert_eq!(view.message, "2 spots available");

        // Another date is a different occurrence
        let other_day = check_availability(&mut conn, session.id, monday() + chrono::Duration::days(7), "09:00")
            .await
            .unwrap();
        assert_eq!(other_day.taken_spots, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_availability_reads_inactive_sessions(pool: PgPool) {
        let session = create_test_session(&pool, &[1], "09:00", "10:00", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        ScheduleSessions::new(&mut conn)
            .update(
                session.id,
                &crate::db::models::sessions::ScheduleSessionUpdateDBRequest {
                    max_capacity: None,
                    is_active: Some(false),
                },
            )
            .await
            .unwrap();

        let view = check_availability(&mut conn, session.id, monday(), "09:00").await.unwrap();
        assert_eq!(view.message, "Last spot available!");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_availability_unknown_session(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let err = check_availability(&mut conn, Uuid::new_v4(), monday(), "09:00").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_date_availability_one_entry_per_slot_sorted(pool: PgPool) {
        let yoga = create_test_class(&pool, ClassCategory::Subscription, 8, 0).await;
        let pilates = create_test_class(&pool, ClassCategory::Subscription, 8, 0).await;
        let evening = create_test_session(&pool, &[1, 3], "18:00", "19:00", 10).await;
        let morning = create_test_session(&pool, &[1], "07:30", "08:30", 2).await;
        let weekend = create_test_session(&pool, &[6], "10:00", "11:00", 10).await;
        link_class_to_session(&pool, evening.id, yoga.id, false).await;
        link_class_to_session(&pool, evening.id, pilates.id, false).await;
        link_class_to_session(&pool, morning.id, yoga.id, false).await;
        link_class_to_session(&pool, weekend.id, yoga.id, false).await;

        let mut conn = pool.acquire().await.unwrap();
        Registrations::new(&mut conn)
            .create(&registration_request(Uuid::new_v4(), yoga.id, Some(morning.id), Some(monday()), Some("07:30")))
            .await
            .unwrap();

        let slots = check_date_availability(&mut conn, monday()).await.unwrap();
        assert_eq!(slots.len(), 2);

        assert_eq!(slots[0].time, "07:30-08:30");
        assert_eq!(slots[0].session_id, morning.id);
        assert_eq!(slots[0].availability.taken_spots, 1);
        assert_eq!(slots[0].availability.message, "Last spot available!");

        assert_eq!(slots[1].time, "18:00-19:00");
        assert_eq!(slots[1].classes.len(), 2);
        assert_eq!(slots[1].availability.message, "Available");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_date_availability_first_session_wins_shared_range(pool: PgPool) {
        let yoga = create_test_class(&pool, ClassCategory::Subscription, 8, 0).await;
        let barre = create_test_class(&pool, ClassCategory::Subscription, 8, 0).await;
        let first = create_test_session(&pool, &[1], "18:00", "19:00", 10).await;
        let second = create_test_session(&pool, &[1], "18:00", "19:00", 4).await;
        link_class_to_session(&pool, first.id, yoga.id, false).await;
        link_class_to_session(&pool, second.id, barre.id, false).await;

        let (winner, winner_class, loser_class) = if first.id < second.id {
            (&first, yoga.id, barre.id)
        } else {
            (&second, barre.id, yoga.id)
        };

        let mut conn = pool.acquire().await.unwrap();
        let slots = check_date_availability(&mut conn, monday()).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].session_id, winner.id);
        assert_eq!(slots[0].availability.max_capacity, winner.max_capacity);
        assert_eq!(slots[0].classes.iter().map(|c| c.class_id).collect::<Vec<_>>(), vec![winner_class]);
        assert!(slots[0].classes.iter().all(|c| c.class_id != loser_class));
    }
}
