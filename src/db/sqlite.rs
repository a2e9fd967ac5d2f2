use std::future::Future;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::row_parsers::{
    access_level_from_row, build_from_row, namespace_from_row, pipeline_from_row,
    project_from_row, protected_branch_from_row,
};
use super::StoreConfig;
use crate::authz::{DataAccess, DataAccessError, ResourceKind};
use crate::models::{AccessLevel, Build, Namespace, Pipeline, Project, ProtectedBranch};

/// [`DataAccess`] backed by the SQLite schema in `migrations/`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bounded<T, F>(&self, lookup: F) -> Result<T, DataAccessError>
    where
        F: Future<Output = Result<T, DataAccessError>>,
    {
        tokio::time::timeout(self.config.lookup_timeout, lookup)
            .await
            .map_err(|_| DataAccessError::Timeout(self.config.lookup_timeout))?
    }

    pub async fn insert_namespace(&self, namespace: &Namespace) -> Result<(), DataAccessError> {
        sqlx::query("INSERT INTO namespaces (id, path, owner_id) VALUES (?, ?, ?)")
            .bind(namespace.id.to_string())
            .bind(&namespace.path)
            .bind(namespace.owner_id.map(|id| id.to_string()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_project(&self, project: &Project) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO projects (id, namespace_id, path, visibility, public_builds, archived) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id.to_string())
        .bind(project.namespace_id.to_string())
        .bind(&project.path)
        .bind(project.visibility.as_str())
        .bind(project.public_builds)
        .bind(project.archived)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<(), DataAccessError> {
        sqlx::query("INSERT INTO pipelines (id, project_id, ref_name, user_id) VALUES (?, ?, ?, ?)")
            .bind(pipeline.id.to_string())
            .bind(pipeline.project_id.to_string())
            .bind(&pipeline.ref_name)
            .bind(pipeline.user_id.map(|id| id.to_string()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_build(&self, build: &Build) -> Result<(), DataAccessError> {
        sqlx::query("INSERT INTO builds (id, pipeline_id, name, ref_name, user_id) VALUES (?, ?, ?, ?, ?)")
            .bind(build.id.to_string())
            .bind(build.pipeline_id.to_string())
            .bind(&build.name)
            .bind(&build.ref_name)
            .bind(build.user_id.map(|id| id.to_string()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        level: AccessLevel,
    ) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO project_members (project_id, user_id, access_level) VALUES (?, ?, ?) \
             ON CONFLICT (project_id, user_id) DO UPDATE SET access_level = excluded.access_level",
        )
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .bind(level.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_protected_branch(&self, branch: &ProtectedBranch) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO protected_branches (id, project_id, name, push_access_level, merge_access_level) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(branch.id.to_string())
        .bind(branch.project_id.to_string())
        .bind(&branch.name)
        .bind(branch.push_access.as_i64())
        .bind(branch.merge_access.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DataAccess for SqliteStore {
    async fn namespace(&self, id: Uuid) -> Result<Namespace, DataAccessError> {
        self.bounded(self.fetch_namespace(id)).await
    }

    async fn project(&self, id: Uuid) -> Result<Project, DataAccessError> {
        self.bounded(self.fetch_project(id)).await
    }

    async fn pipeline(&self, id: Uuid) -> Result<Pipeline, DataAccessError> {
        self.bounded(self.fetch_pipeline(id)).await
    }

    async fn build(&self, id: Uuid) -> Result<Build, DataAccessError> {
        self.bounded(self.fetch_build(id)).await
    }

    async fn access_level(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AccessLevel>, DataAccessError> {
        self.bounded(self.fetch_access_level(project_id, user_id)).await
    }

    async fn protected_branches(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProtectedBranch>, DataAccessError> {
        self.bounded(self.fetch_protected_branches(project_id)).await
    }
}

impl SqliteStore {
    async fn fetch_namespace(&self, id: Uuid) -> Result<Namespace, DataAccessError> {
        let row = sqlx::query("SELECT id, path, owner_id FROM namespaces WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Namespace, id))?;
        namespace_from_row(&row)
    }

    async fn fetch_project(&self, id: Uuid) -> Result<Project, DataAccessError> {
        let row = sqlx::query(
            "SELECT id, namespace_id, path, visibility, public_builds, archived FROM projects WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DataAccessError::not_found(ResourceKind::Project, id))?;
        project_from_row(&row)
    }

    async fn fetch_pipeline(&self, id: Uuid) -> Result<Pipeline, DataAccessError> {
        let row = sqlx::query("SELECT id, project_id, ref_name, user_id FROM pipelines WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Pipeline, id))?;
        pipeline_from_row(&row)
    }

    async fn fetch_build(&self, id: Uuid) -> Result<Build, DataAccessError> {
        let row = sqlx::query("SELECT id, pipeline_id, name, ref_name, user_id FROM builds WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Build, id))?;
        build_from_row(&row)
    }

    async fn fetch_access_level(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AccessLevel>, DataAccessError> {
        // Owners of the project's namespace rank as project owners.
        let row = sqlx::query(
            "SELECT CASE WHEN n.owner_id = ?2 THEN 50 ELSE m.access_level END AS access_level \
             FROM projects p \
             JOIN namespaces n ON n.id = p.namespace_id \
             LEFT JOIN project_members m ON m.project_id = p.id AND m.user_id = ?2 \
             WHERE p.id = ?1",
        )
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let level: Option<i64> = row.try_get("access_level")?;
        match level {
            Some(_) => access_level_from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_protected_branches(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProtectedBranch>, DataAccessError> {
        let rows = sqlx::query(
            "SELECT id, project_id, name, push_access_level, merge_access_level FROM protected_branches WHERE project_id = ? ORDER BY name",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(protected_branch_from_row).collect()
    }
}
