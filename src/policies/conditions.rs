//! Conditions shared by several policies.

use async_trait::async_trait;
use uuid::Uuid;

use crate::authz::{
    condition_fn, Condition, DataAccess, DataAccessError, Resource, ResourceKind, Subject,
};
use crate::models::AccessLevel;

pub fn admin() -> impl Condition {
    condition_fn(|subject, _| Ok(subject.is_admin()))
}

pub fn authenticated() -> impl Condition {
    condition_fn(|subject, _| Ok(!subject.is_anonymous()))
}

/// Holds when the subject's access level on the project is at least the wrapped level.
pub struct MemberAtLeast(pub AccessLevel);

#[async_trait]
impl Condition for MemberAtLeast {
    async fn evaluate(
        &self,
        subject: &Subject,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<bool, DataAccessError> {
        let Some(user_id) = subject.id() else {
            return Ok(false);
        };
        let project = resource.as_project()?;
        let level = store.access_level(project.id, user_id).await?;
        Ok(level.is_some_and(|level| level >= self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCheck {
    /// Some protected branch of the project matches the ref.
    Protected,
    /// A matching protected branch lets the subject push.
    PushAllowed,
    /// A matching protected branch lets the subject merge.
    MergeAllowed,
}

/// Branch-protection checks for resources that run on a ref (pipelines
/// and builds).
pub struct BranchRule(pub BranchCheck);

#[async_trait]
impl Condition for BranchRule {
    async fn evaluate(
        &self,
        subject: &Subject,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<bool, DataAccessError> {
        let (project_id, ref_name) = ref_target(resource, store).await?;
        let branches: Vec<_> = store
            .protected_branches(project_id)
            .await?
            .into_iter()
            .filter(|branch| branch.matches(&ref_name))
            .collect();

        if self.0 == BranchCheck::Protected {
            return Ok(!branches.is_empty());
        }
        if branches.is_empty() {
            return Ok(false);
        }

        let Some(user_id) = subject.id() else {
            return Ok(false);
        };
        let Some(level) = store.access_level(project_id, user_id).await? else {
            return Ok(false);
        };

        Ok(branches.iter().any(|branch| match self.0 {
            BranchCheck::PushAllowed => branch.push_access.grants(level),
            BranchCheck::MergeAllowed => branch.merge_access.grants(level),
            BranchCheck::Protected => true,
        }))
    }
}

async fn ref_target(
    resource: &Resource,
    store: &dyn DataAccess,
) -> Result<(Uuid, String), DataAccessError> {
    match resource {
        Resource::Pipeline(pipeline) => Ok((pipeline.project_id, pipeline.ref_name.clone())),
        Resource::Build(build) => {
            let pipeline = store.pipeline(build.pipeline_id).await?;
            Ok((pipeline.project_id, build.ref_name.clone()))
        }
        other => Err(DataAccessError::UnexpectedResource {
            expected: ResourceKind::Pipeline,
            found: other.kind(),
        }),
    }
}
