use async_trait::async_trait;

use super::abilities::UPDATE_BUILD;
use super::conditions::{BranchCheck, BranchRule};
use crate::authz::{
    cond, DataAccess, DataAccessError, Delegate, PolicyBuilder, Resource, ResourceKind,
};

/// Build -> the project of its pipeline.
pub struct BuildProject;

#[async_trait]
impl Delegate for BuildProject {
    async fn resolve(
        &self,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<Resource, DataAccessError> {
        let build = resource.as_build()?;
        let pipeline = store.pipeline(build.pipeline_id).await?;
        Ok(Resource::Project(store.project(pipeline.project_id).await?))
    }
}

pub fn policy() -> PolicyBuilder {
    PolicyBuilder::new(ResourceKind::Build)
        .abilities([UPDATE_BUILD])
        .delegate("project", ResourceKind::Project, BuildProject)
        .condition("protected_ref", BranchRule(BranchCheck::Protected))
        .condition("push_allowed", BranchRule(BranchCheck::PushAllowed))
        .condition("merge_allowed", BranchRule(BranchCheck::MergeAllowed))
        // Overrides the project-level developer grant.
        .rule(cond("protected_ref") & !(cond("push_allowed") | cond("merge_allowed")))
        .prevent([UPDATE_BUILD])
}
