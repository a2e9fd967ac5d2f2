use async_trait::async_trait;

use super::abilities::*;
use super::conditions::{self, MemberAtLeast};
use crate::authz::{
    cond, condition_fn, ConditionScope, DataAccess, DataAccessError, Delegate, PolicyBuilder,
    Resource, ResourceKind,
};
use crate::models::AccessLevel;

/// Project -> its namespace.
pub struct ProjectNamespace;

#[async_trait]
impl Delegate for ProjectNamespace {
    async fn resolve(
        &self,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<Resource, DataAccessError> {
        let project = resource.as_project()?;
        Ok(Resource::Namespace(store.namespace(project.namespace_id).await?))
    }
}

pub fn policy() -> PolicyBuilder {
    use ConditionScope::{ResourceOnly, SubjectOnly};

    PolicyBuilder::new(ResourceKind::Project)
        .abilities([
            READ_PROJECT,
            ADMIN_PROJECT,
            READ_PIPELINE,
            CREATE_PIPELINE,
            UPDATE_PIPELINE,
            READ_BUILD,
            UPDATE_BUILD,
        ])
        .delegate("namespace", ResourceKind::Namespace, ProjectNamespace)
        .scoped_condition("admin", SubjectOnly, conditions::admin())
        .scoped_condition("authenticated", SubjectOnly, conditions::authenticated())
        .scoped_condition(
            "public_project",
            ResourceOnly,
            condition_fn(|_, resource| Ok(resource.as_project()?.is_public())),
        )
        .scoped_condition(
            "internal_project",
            ResourceOnly,
            condition_fn(|_, resource| Ok(resource.as_project()?.is_internal())),
        )
        .scoped_condition(
            "public_builds",
            ResourceOnly,
            condition_fn(|_, resource| Ok(resource.as_project()?.public_builds)),
        )
        .scoped_condition(
            "archived",
            ResourceOnly,
            condition_fn(|_, resource| Ok(resource.as_project()?.archived)),
        )
        .condition("guest", MemberAtLeast(AccessLevel::Guest))
        .condition("reporter", MemberAtLeast(AccessLevel::Reporter))
        .condition("developer", MemberAtLeast(AccessLevel::Developer))
        .condition("maintainer", MemberAtLeast(AccessLevel::Maintainer))
        // visibility
        .rule(cond("public_project"))
        .enable([READ_PROJECT])
        .rule(cond("internal_project") & cond("authenticated"))
        .enable([READ_PROJECT])
        .rule(cond("guest"))
        .enable([READ_PROJECT])
        // pipelines and builds
        .rule(cond("public_project") & cond("public_builds"))
        .enable([READ_BUILD, READ_PIPELINE])
        .rule(cond("internal_project") & cond("authenticated") & cond("public_builds"))
        .enable([READ_BUILD, READ_PIPELINE])
        .rule(cond("guest"))
        .enable([READ_BUILD, READ_PIPELINE])
        .rule(!cond("public_builds") & !cond("reporter"))
        .prevent([READ_BUILD, READ_PIPELINE])
        .rule(cond("developer"))
        .enable([CREATE_PIPELINE, UPDATE_PIPELINE, UPDATE_BUILD])
        .rule(cond("maintainer"))
        .enable([ADMIN_PROJECT])
        .rule(cond("admin"))
        .enable([
            READ_PROJECT,
            ADMIN_PROJECT,
            READ_PIPELINE,
            CREATE_PIPELINE,
            UPDATE_PIPELINE,
            READ_BUILD,
            UPDATE_BUILD,
        ])
        // archived projects are read-only for everyone
        .rule(cond("archived"))
        .prevent([CREATE_PIPELINE, UPDATE_PIPELINE, UPDATE_BUILD, ADMIN_PROJECT])
}
