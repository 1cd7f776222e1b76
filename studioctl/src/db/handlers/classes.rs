//! Database repository for bookable classes.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::classes::{Class, ClassCreateDBRequest, ClassFilter, ClassUpdateDBRequest},
    },
    types::{ClassId, abbrev_uuid},
};

const CLASS_COLUMNS: &str =
    "id, name, category, class_type, group_credits, private_credits, price, is_active, created_at, updated_at";

pub struct Classes<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Classes<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Classes<'c> {
    type CreateRequest = ClassCreateDBRequest;
    type UpdateRequest = ClassUpdateDBRequest;
    type Response = Class;
    type Id = ClassId;
    type Filter = ClassFilter;

    #[instrument(skip(self, request), fields(name = %request.name, category = %request.category), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let class = sqlx::query_as::<_, Class>(&format!(
            r#"
            INSERT INTO classes (name, category, class_type, group_credits, private_credits, price, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CLASS_COLUMNS}
            "#
        ))
        .bind(&request.name)
        .bind(request.category.as_str())
        .bind(request.class_type)
        .bind(request.group_credits)
        .bind(request.private_credits)
        .bind(request.price)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(class)
    }

    #[instrument(skip(self), fields(class_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let class = sqlx::query_as::<_, Class>(&format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(class)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let classes = sqlx::query_as::<_, Class>(&format!(
            r#"
            SELECT {CLASS_COLUMNS}
            FROM classes
            WHERE ($1 = FALSE OR is_active = TRUE)
            ORDER BY name, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(filter.active_only)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(classes)
    }

    #[instrument(skip(self, request), fields(class_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let class = sqlx::query_as::<_, Class>(&format!(
            r#"
            UPDATE classes
            SET is_active = COALESCE($2, is_active),
                price = COALESCE($3, price),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CLASS_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.is_active)
        .bind(request.price)
        .fetch_optional(&mut *self.db)
        .await?;

        class.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::classes::{ClassCategory, ClassType};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn subscription_class() -> ClassCreateDBRequest {
        ClassCreateDBRequest {
            name: "Morning Flow".to_string(),
            category: ClassCategory::Subscription,
            class_type: ClassType::Group,
            group_credits: 8,
            private_credits: 0,
            price: Decimal::new(12000, 2),
            is_active: true,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_class(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Classes::new(&mut conn);

        let created = repo.create(&subscription_class()).await.unwrap();
        assert_eq!(created.category, ClassCategory::Subscription);
        assert_eq!(created.class_type, ClassType::Group);
        assert_eq!(created.group_credits, 8);

        let fetched = repo.get_by_id(created.id).await.unwrap().expect("class should exist");
        assert_eq!(fetched.name, "Morning Flow");
        assert_eq!(fetched.price, Decimal::new(12000, 2));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_free_text_category_is_preserved(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Classes::new(&mut conn);

        let mut request = subscription_class();
        request.category = ClassCategory::from("workshop");
        let created = repo.create(&request).await.unwrap();

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.category, ClassCategory::Other("workshop".to_string()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_deactivates_class(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Classes::new(&mut conn);

        let created = repo.create(&subscription_class()).await.unwrap();
        let updated = repo
            .update(
                created.id,
                &ClassUpdateDBRequest {
                    is_active: Some(false),
                    price: None,
                },
            )
            .await
            .unwrap();

        assert!(!updated.is_active);
        assert_eq!(updated.price, created.price);

        let active = repo
            .list(&ClassFilter {
                active_only: true,
                skip: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert!(active.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_missing_class_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Classes::new(&mut conn);

        let result = repo.update(uuid::Uuid::new_v4(), &ClassUpdateDBRequest::default()).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }
}
