use async_trait::async_trait;
use std::sync::Arc;

use super::error::ApiError;
use crate::core::resource::{LinkKind, ListFilter, Record, ResourceKind};

/// Typed CRUD surface of the remote resource hierarchy.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError>;

    /// Fails with [`ApiError::NotFound`] when the record does not exist.
    async fn get(&self, kind: ResourceKind, id: i64) -> Result<Record, ApiError>;

    async fn delete(&self, kind: ResourceKind, id: i64) -> Result<(), ApiError>;

    async fn list_links(
        &self,
        link: LinkKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError>;

    /// Base URL of the environment this client talks to.
    fn environment_url(&self) -> &str;
}

#[async_trait]
impl<T: ResourceApi + ?Sized> ResourceApi for Arc<T> {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        (**self).list(kind, filter).await
    }

    async fn get(&self, kind: ResourceKind, id: i64) -> Result<Record, ApiError> {
        (**self).get(kind, id).await
    }

    async fn delete(&self, kind: ResourceKind, id: i64) -> Result<(), ApiError> {
        (**self).delete(kind, id).await
    }

    async fn list_links(
        &self,
        link: LinkKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        (**self).list_links(link, filter).await
    }

    fn environment_url(&self) -> &str {
        (**self).environment_url()
    }
}
