//! Database repository for recurring schedule sessions and their class links.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::sessions::{
            ScheduleSession, ScheduleSessionCreateDBRequest, ScheduleSessionFilter, ScheduleSessionUpdateDBRequest, ScheduledClass,
            SessionClass, SessionClassCreateDBRequest,
        },
    },
    types::{SessionClassId, SessionId, abbrev_uuid},
};

const SESSION_COLUMNS: &str = "id, weekdays, start_time, end_time, max_capacity, is_active, created_at, updated_at";
const SESSION_CLASS_COLUMNS: &str = "id, session_id, class_id, price, is_trial, max_uses_per_user, created_at";

pub struct ScheduleSessions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ScheduleSessions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(session_id = %abbrev_uuid(&request.session_id)), err)]
    pub async fn create_session_class(&mut self, request: &SessionClassCreateDBRequest) -> Result<SessionClass> {
        let link = sqlx::query_as::<_, SessionClass>(&format!(
            r#"
            INSERT INTO session_classes (session_id, class_id, price, is_trial, max_uses_per_user)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_CLASS_COLUMNS}
            "#
        ))
        .bind(request.session_id)
        .bind(request.class_id)
        .bind(request.price)
        .bind(request.is_trial)
        .bind(request.max_uses_per_user)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(link)
    }

    #[instrument(skip(self), fields(session_class_id = %abbrev_uuid(&id)), err)]
    pub async fn get_session_class(&mut self, id: SessionClassId) -> Result<Option<SessionClass>> {
        let link = sqlx::query_as::<_, SessionClass>(&format!("SELECT {SESSION_CLASS_COLUMNS} FROM session_classes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(link)
    }

    /// Every session/class pairing whose session recurs on `weekday` (0 = Sunday). Both the
    /// session and the class must be active.
    #[instrument(skip(self), err)]
    pub async fn list_scheduled_for_weekday(&mut self, weekday: i16) -> Result<Vec<ScheduledClass>> {
        let rows = sqlx::query_as::<_, ScheduledClass>(
            r#"
            SELECT s.id AS session_id,
                   sc.id AS session_class_id,
                   c.id AS class_id,
                   c.name AS class_name,
                   s.weekdays,
                   s.start_time,
                   s.end_time,
                   s.max_capacity
            FROM session_classes sc
            JOIN schedule_sessions s ON s.id = sc.session_id
            JOIN classes c ON c.id = sc.class_id
            WHERE s.is_active = TRUE
              AND c.is_active = TRUE
              AND $1 = ANY(s.weekdays)
            ORDER BY s.start_time, s.id, c.name
            "#,
        )
        .bind(weekday)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for ScheduleSessions<'c> {
    type CreateRequest = ScheduleSessionCreateDBRequest;
    type UpdateRequest = ScheduleSessionUpdateDBRequest;
    type Response = ScheduleSession;
    type Id = SessionId;
    type Filter = ScheduleSessionFilter;

    #[instrument(skip(self, request), fields(max_capacity = request.max_capacity), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let session = sqlx::query_as::<_, ScheduleSession>(&format!(
            r#"
            INSERT INTO schedule_sessions (weekdays, start_time, end_time, max_capacity, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(&request.weekdays)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(request.max_capacity)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(session)
    }

    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let session = sqlx::query_as::<_, ScheduleSession>(&format!("SELECT {SESSION_COLUMNS} FROM schedule_sessions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(session)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let sessions = sqlx::query_as::<_, ScheduleSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM schedule_sessions
            WHERE ($1 = FALSE OR is_active = TRUE)
              AND ($2::SMALLINT IS NULL OR $2 = ANY(weekdays))
            ORDER BY start_time, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.active_only)
        .bind(filter.weekday)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(sessions)
    }

    #[instrument(skip(self, request), fields(session_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let session = sqlx::query_as::<_, ScheduleSession>(&format!(
            r#"
            UPDATE schedule_sessions
            SET max_capacity = COALESCE($2, max_capacity),
                is_active = COALESCE($3, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.max_capacity)
        .bind(request.is_active)
        .fetch_optional(&mut *self.db)
        .await?;

        session.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::utils::{create_test_class, create_test_session, link_class_to_session};
    use crate::db::models::classes::ClassCategory;
    use chrono::NaiveTime;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_session_and_filter_by_weekday(pool: PgPool) {
        let monday = create_test_session(&pool, &[1], "09:00", "10:00", 5).await;
        let _saturday = create_test_session(&pool, &[6], "11:00", "12:00", 5).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ScheduleSessions::new(&mut conn);

        let sessions = repo
            .list(&ScheduleSessionFilter {
                active_only: true,
                weekday: Some(1),
                skip: 0,
                limit: 10,
            })
            .await
            .unwrap();

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, monday.id);
        assert_eq!(sessions[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_scheduled_classes_skip_inactive_sessions(pool: PgPool) {
        let class = create_test_class(&pool, ClassCategory::Subscription, 8, 0).await;
        let active = create_test_session(&pool, &[2, 4], "18:00", "19:00", 10).await;
        let inactive = create_test_session(&pool, &[2], "20:00", "21:00", 10).await;
        link_class_to_session(&pool, active.id, class.id, false).await;
        link_class_to_session(&pool, inactive.id, class.id, false).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ScheduleSessions::new(&mut conn);
        repo.update(
            inactive.id,
            &ScheduleSessionUpdateDBRequest {
                max_capacity: None,
                is_active: Some(false),
            },
        )
        .await
        .unwrap();

        let tuesday = repo.list_scheduled_for_weekday(2).await.unwrap();
        assert_eq!(tuesday.len(), 1);
        assert_eq!(tuesday[0].session_id, active.id);
        assert_eq!(tuesday[0].class_id, class.id);

        let sunday = repo.list_scheduled_for_weekday(0).await.unwrap();
        assert!(sunday.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_capacity_must_be_positive(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ScheduleSessions::new(&mut conn);

        let result = repo
            .create(&ScheduleSessionCreateDBRequest {
                weekdays: vec![1],
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                max_capacity: 0,
                is_active: true,
            })
            .await;

        assert!(matches!(result, Err(DbError::CheckViolation { .. })));
    }
}
