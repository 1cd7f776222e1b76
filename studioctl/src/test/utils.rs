use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    booking::{
        lifecycle::{RegistrationManager, RegistrationRequest},
        slot,
    },
    config::BookingConfig,
    db::{
        handlers::{Classes, Credits, Repository, ScheduleSessions},
        models::{
            classes::{Class, ClassCategory, ClassCreateDBRequest, ClassType},
            credits::{CreditGroup, SubscriptionCredit},
            registrations::RegistrationCreateDBRequest,
            sessions::{ScheduleSession, ScheduleSessionCreateDBRequest, SessionClass, SessionClassCreateDBRequest},
        },
    },
    types::{ClassId, SessionId, UserId},
};

fn time(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M").expect("Invalid fixture time")
}

/// An active class whose `class_type` accepts the credits its category can be paid with
pub async fn create_test_class(pool: &PgPool, category: ClassCategory, group_credits: i32, private_credits: i32) -> Class {
    let class_type = match category {
        ClassCategory::Subscription => ClassType::Group,
        ClassCategory::Private => ClassType::Private,
        _ => ClassType::Both,
    };

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Classes::new(&mut conn)
        .create(&ClassCreateDBRequest {
            name: format!("{category} class {}", Uuid::new_v4().simple()),
            category,
            class_type,
            group_credits,
            private_credits,
            price: Decimal::new(20000, 2),
            is_active: true,
        })
        .await
        .expect("Failed to create test class")
}

pub async fn create_test_session(pool: &PgPool, weekdays: &[i16], start: &str, end: &str, max_capacity: i32) -> ScheduleSession {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    ScheduleSessions::new(&mut conn)
        .create(&ScheduleSessionCreateDBRequest {
            weekdays: weekdays.to_vec(),
            start_time: time(start),
            end_time: time(end),
            max_capacity,
            is_active: true,
        })
        .await
        .expect("Failed to create test session")
}

pub async fn link_class_to_session(pool: &PgPool, session_id: SessionId, class_id: ClassId, is_trial: bool) -> SessionClass {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    ScheduleSessions::new(&mut conn)
        .create_session_class(&SessionClassCreateDBRequest {
            session_id,
            class_id,
            price: Decimal::new(2500, 2),
            is_trial,
            max_uses_per_user: is_trial.then_some(1),
        })
        .await
        .expect("Failed to link class to session")
}

/// Insert a separate ledger row with `amount` credits
pub async fn grant_credits(pool: &PgPool, user_id: UserId, group: CreditGroup, amount: i32) -> SubscriptionCredit {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Credits::new(&mut conn)
        .insert_grant(user_id, group, amount, None)
        .await
        .expect("Failed to grant credits")
}

/// Store-level insert request with every term accepted and no payment
pub fn registration_request(
    user_id: UserId,
    class_id: ClassId,
    session_id: Option<SessionId>,
    selected_date: Option<NaiveDate>,
    selected_time: Option<&str>,
) -> RegistrationCreateDBRequest {
    RegistrationCreateDBRequest {
        user_id,
        class_id,
        session_id,
        session_class_id: None,
        selected_date,
        selected_time: selected_time.map(str::to_string),
        slot_time: selected_time.map(|t| slot::normalize(t).expect("Invalid fixture time")),
        used_credit: false,
        credit_type: None,
        purchase_price: None,
        terms_accepted: true,
        health_declaration_accepted: true,
        cancellation_policy_accepted: true,
    }
}

/// Service-level booking request with every term accepted and no payment
pub fn booking_request(
    class_id: ClassId,
    session_id: Option<SessionId>,
    selected_date: Option<NaiveDate>,
    selected_time: Option<&str>,
) -> RegistrationRequest {
    RegistrationRequest {
        class_id,
        session_id,
        session_class_id: None,
        selected_date,
        selected_time: selected_time.map(str::to_string),
        used_credit: false,
        credit_type: None,
        purchase_price: None,
        terms_accepted: true,
        health_declaration_accepted: true,
        cancellation_policy_accepted: true,
    }
}

/// Same as [`booking_request`], paid with one credit of `group`
pub fn credit_booking_request(
    class_id: ClassId,
    session_id: Option<SessionId>,
    selected_date: Option<NaiveDate>,
    selected_time: Option<&str>,
    group: CreditGroup,
) -> RegistrationRequest {
    RegistrationRequest {
        used_credit: true,
        credit_type: Some(group),
        ..booking_request(class_id, session_id, selected_date, selected_time)
    }
}

pub fn create_test_manager(pool: &PgPool) -> RegistrationManager {
    RegistrationManager::builder().db(pool.clone()).build()
}

pub fn create_test_manager_with(pool: &PgPool, config: BookingConfig) -> RegistrationManager {
    RegistrationManager::builder().db(pool.clone()).config(config).build()
}
