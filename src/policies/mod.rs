//! Concrete policies for the CI resource graph
//! (build -> pipeline -> project -> namespace).

pub mod build;
pub mod conditions;
pub mod namespace;
pub mod pipeline;
pub mod project;

use crate::authz::{PolicyRegistry, PolicyResult};

/// Well-known ability names
pub mod abilities {
    use crate::authz::Ability;

    // Namespace
    pub const READ_NAMESPACE: Ability = Ability::new("read_namespace");
    pub const ADMIN_NAMESPACE: Ability = Ability::new("admin_namespace");

    // Project
    pub const READ_PROJECT: Ability = Ability::new("read_project");
    pub const ADMIN_PROJECT: Ability = Ability::new("admin_project");

    // Pipeline
    pub const READ_PIPELINE: Ability = Ability::new("read_pipeline");
    pub const CREATE_PIPELINE: Ability = Ability::new("create_pipeline");
    pub const UPDATE_PIPELINE: Ability = Ability::new("update_pipeline");

    // Build
    pub const READ_BUILD: Ability = Ability::new("read_build");
    pub const UPDATE_BUILD: Ability = Ability::new("update_build");
}

/// Builds the registry with every CI policy. Fails on invalid declarations,
/// so callers should treat an error as fatal at startup.
pub fn registry() -> PolicyResult<PolicyRegistry> {
    PolicyRegistry::builder()
        .policy(namespace::policy())
        .policy(project::policy())
        .policy(pipeline::policy())
        .policy(build::policy())
        .build()
}

#[cfg(test)]
mod tests {
    use super::abilities::*;
    use super::*;
    use crate::authz::ResourceKind;

    #[test]
    fn default_registry_is_valid() {
        let registry = registry().expect("ci policies are valid");
        assert_eq!(registry.kinds().count(), 4);
    }

    #[test]
    fn build_rules_follow_project_rules() {
        let registry = registry().expect("ci policies are valid");
        let plan = registry.plan(ResourceKind::Build).expect("build plan");

        let last = plan.last().expect("build plan is not empty");
        assert_eq!(last.policy, ResourceKind::Build);
        assert!(last.rule.affects(UPDATE_BUILD));
        assert_eq!(plan.first().map(|p| p.policy), Some(ResourceKind::Namespace));
    }

    #[test]
    fn build_vocabulary_includes_delegated_abilities() {
        let registry = registry().expect("ci policies are valid");
        let abilities = registry.abilities(ResourceKind::Build).expect("abilities");
        for ability in [READ_BUILD, UPDATE_BUILD, READ_PROJECT, READ_NAMESPACE] {
            assert!(abilities.contains(&ability), "missing {ability}");
        }
    }
}
