use super::abilities::{ADMIN_NAMESPACE, READ_NAMESPACE};
use super::conditions;
use crate::authz::{cond, condition_fn, ConditionScope, PolicyBuilder, ResourceKind};

pub fn policy() -> PolicyBuilder {
    PolicyBuilder::new(ResourceKind::Namespace)
        .abilities([READ_NAMESPACE, ADMIN_NAMESPACE])
        .scoped_condition("admin", ConditionScope::SubjectOnly, conditions::admin())
        .condition(
            "owner",
            condition_fn(|subject, resource| {
                let namespace = resource.as_namespace()?;
                Ok(subject.id().is_some_and(|id| namespace.is_owned_by(id)))
            }),
        )
        .rule(cond("owner"))
        .enable([READ_NAMESPACE, ADMIN_NAMESPACE])
        .rule(cond("admin"))
        .enable([READ_NAMESPACE, ADMIN_NAMESPACE])
}
