use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::resource::{Resource, ResourceId, ResourceKind};
use crate::models::{AccessLevel, Build, Namespace, Pipeline, Project, ProtectedBranch};

#[derive(thiserror::Error, Debug)]
pub enum DataAccessError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: Uuid },
    #[error("expected a {expected} resource, got a {found}")]
    UnexpectedResource {
        expected: ResourceKind,
        found: ResourceKind,
    },
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("data access failed: {0}")]
    Backend(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl DataAccessError {
    pub fn not_found(kind: ResourceKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Read-only access to the records conditions and delegations need.
///
/// Implementations must be idempotent. They are not assumed to be cheap;
/// the authorization context bounds how often each lookup runs.
#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn namespace(&self, id: Uuid) -> Result<Namespace, DataAccessError>;

    async fn project(&self, id: Uuid) -> Result<Project, DataAccessError>;

    async fn pipeline(&self, id: Uuid) -> Result<Pipeline, DataAccessError>;

    async fn build(&self, id: Uuid) -> Result<Build, DataAccessError>;

    /// Effective access level of `user_id` on a project, if any.
    async fn access_level(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AccessLevel>, DataAccessError>;

    async fn protected_branches(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProtectedBranch>, DataAccessError>;

    async fn load(&self, id: ResourceId) -> Result<Resource, DataAccessError> {
        let resource = match id.kind {
            ResourceKind::Namespace => Resource::Namespace(self.namespace(id.id).await?),
            ResourceKind::Project => Resource::Project(self.project(id.id).await?),
            ResourceKind::Pipeline => Resource::Pipeline(self.pipeline(id.id).await?),
            ResourceKind::Build => Resource::Build(self.build(id.id).await?),
        };
        Ok(resource)
    }
}
