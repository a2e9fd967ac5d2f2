use async_trait::async_trait;

use super::abilities::{UPDATE_BUILD, UPDATE_PIPELINE};
use super::conditions::{BranchCheck, BranchRule};
use crate::authz::{
    cond, DataAccess, DataAccessError, Delegate, PolicyBuilder, Resource, ResourceKind,
};

/// Pipeline -> its project.
pub struct PipelineProject;

#[async_trait]
impl Delegate for PipelineProject {
    async fn resolve(
        &self,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<Resource, DataAccessError> {
        let pipeline = resource.as_pipeline()?;
        Ok(Resource::Project(store.project(pipeline.project_id).await?))
    }
}

pub fn policy() -> PolicyBuilder {
    PolicyBuilder::new(ResourceKind::Pipeline)
        .abilities([UPDATE_PIPELINE, UPDATE_BUILD])
        .delegate("project", ResourceKind::Project, PipelineProject)
        .condition("protected_ref", BranchRule(BranchCheck::Protected))
        .condition("push_allowed", BranchRule(BranchCheck::PushAllowed))
        .condition("merge_allowed", BranchRule(BranchCheck::MergeAllowed))
        // Builds of a locked ref cannot be updated through their pipeline either.
        .rule(cond("protected_ref") & !(cond("push_allowed") | cond("merge_allowed")))
        .prevent([UPDATE_PIPELINE, UPDATE_BUILD])
}
