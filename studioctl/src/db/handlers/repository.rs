//! Shared CRUD surface for table repositories.
//!
//! Registrations, classes and schedule sessions all expose the same create/read/list/update shape;
//! the ledger and trial tracker do not, because their mutations are keyed by
//! `(user, group)` or `(user, class)` rather than by row ID.

use crate::db::errors::Result;

#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;

    /// Partial update payload; only the fields the table allows to change after creation
    type UpdateRequest;

    type Response;

    type Id: Send + Sync;

    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Fails with [`crate::db::errors::DbError::NotFound`] when the row does not exist
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
