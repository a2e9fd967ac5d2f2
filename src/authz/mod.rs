//! Authorization module - declarative policy engine
//!
//! This module answers "may this subject do this to that resource?":
//! - Ordered rules per resource type (`condition -> enable/prevent abilities`)
//! - Delegation to the policies of related resources
//! - Per-request condition caching
//! - Last-matching-rule-wins resolution with default deny

mod condition;
mod context;
mod data_access;
mod delegation;
mod error;
mod registry;
mod resolver;
mod resource;
mod rule;
mod subject;

pub use condition::{
    cond, condition_fn, Condition, ConditionExpr, ConditionScope, FnCondition, RegisteredCondition,
};
pub use context::{AuthorizationContext, CacheKey};
pub use data_access::{DataAccess, DataAccessError};
pub use delegation::{Delegate, Delegation};
pub use error::{PolicyError, PolicyResult};
pub use registry::{PlannedRule, Policy, PolicyBuilder, PolicyRegistry, RegistryBuilder, RuleDecl};
pub use resolver::{AbilityResolver, Decision, RuleTrace};
pub use resource::{Resource, ResourceId, ResourceKind};
pub use rule::{Ability, Effect, Rule};
pub use subject::{Subject, SubjectKey};
