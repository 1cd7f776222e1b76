//! Database repository for one-time trial entitlements.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{errors::Result, models::trial_usages::TrialUsage},
    types::{ClassId, UserId, abbrev_uuid},
};

pub struct TrialUsages<'c> {
    db: &'c mut PgConnection,
}

impl<'c> TrialUsages<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Serialise trial checks for one (user, class) pair until the transaction ends
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn lock_pair(&mut self, user_id: UserId, class_id: ClassId) -> Result<()> {
        let key = format!("trial:{user_id}:{class_id}");
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn has_used(&mut self, user_id: UserId, class_id: ClassId) -> Result<bool> {
        let used = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM trial_usages WHERE user_id = $1 AND class_id = $2)")
            .bind(user_id)
            .bind(class_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(used)
    }

    /// Record that the trial has been consumed.
    ///
    /// Idempotent: returns `false` when the pair was already recorded, without raising the
    /// uniqueness violation.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn record(&mut self, user_id: UserId, class_id: ClassId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO trial_usages (user_id, class_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, class_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove the marker, restoring the entitlement. Returns whether a row existed.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), class_id = %abbrev_uuid(&class_id)), err)]
    pub async fn release(&mut self, user_id: UserId, class_id: ClassId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trial_usages WHERE user_id = $1 AND class_id = $2")
            .bind(user_id)
            .bind(class_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<TrialUsage>> {
        let usages = sqlx::query_as::<_, TrialUsage>(
            "SELECT id, user_id, class_id, used_at FROM trial_usages WHERE user_id = $1 ORDER BY used_at",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(usages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::classes::ClassCategory;
    use crate::test::utils::create_test_class;
    use sqlx::PgPool;
    use uuid::Uuid;

    #[sqlx::test]
    #[test_log::test]
    async fn test_record_is_idempotent(pool: PgPool) {
        let class = create_test_class(&pool, ClassCategory::Trial, 0, 0).await;
        let user = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = TrialUsages::new(&mut conn);

        assert!(!repo.has_used(user, class.id).await.unwrap());
        assert!(repo.record(user, class.id).await.unwrap());
        assert!(!repo.record(user, class.id).await.unwrap());
        assert!(repo.has_used(user, class.id).await.unwrap());
        assert_eq!(repo.list_for_user(user).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_release_restores_entitlement(pool: PgPool) {
        let class = create_test_class(&pool, ClassCategory::Trial, 0, 0).await;
        let user = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = TrialUsages::new(&mut conn);

        repo.record(user, class.id).await.unwrap();
        assert!(repo.release(user, class.id).await.unwrap());
        assert!(!repo.has_used(user, class.id).await.unwrap());
        assert!(!repo.release(user, class.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_usage_is_per_class(pool: PgPool) {
        let first = create_test_class(&pool, ClassCategory::Trial, 0, 0).await;
        let second = create_test_class(&pool, ClassCategory::Trial, 0, 0).await;
        let user = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = TrialUsages::new(&mut conn);

        repo.record(user, first.id).await.unwrap();
        assert!(!repo.has_used(user, second.id).await.unwrap());
    }
}
