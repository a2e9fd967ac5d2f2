//! Ability resolution.
//!
//! The decision for `(subject, resource, ability)` is the effect of the
//! last rule in the flattened plan that mentions the ability and whose
//! condition holds; with no such rule the ability is denied. A failed
//! lookup for any rule that mentions the ability is an error. Delegated
//! rules sit before the owning policy's rules, so more specific policies
//! override the general ones they delegate to.

use std::collections::BTreeSet;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::condition::ConditionExpr;
use super::context::{AuthorizationContext, CacheKey, ContextStore};
use super::data_access::{DataAccess, DataAccessError};
use super::delegation::Delegation;
use super::error::{PolicyError, PolicyResult};
use super::registry::{PlannedRule, Policy, PolicyRegistry};
use super::resource::{Resource, ResourceId, ResourceKind};
use super::rule::{Ability, Effect};
use super::subject::Subject;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One evaluated rule in an [`AbilityResolver::explain`] trace.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RuleTrace {
    pub policy: ResourceKind,
    pub rule: usize,
    pub resource: ResourceId,
    pub condition: String,
    pub effect: Effect,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Decision {
    #[schema(value_type = String, example = "update_build")]
    pub ability: Ability,
    pub resource: ResourceId,
    pub allowed: bool,
    pub trace: Vec<RuleTrace>,
}

/// The resource a planned rule applies to: the queried one, or one reached
/// through delegation.
enum Target<'a> {
    Root(&'a Resource),
    Delegated(Arc<Resource>),
}

impl Deref for Target<'_> {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        match self {
            Target::Root(resource) => resource,
            Target::Delegated(resource) => resource,
        }
    }
}

#[derive(Clone)]
pub struct AbilityResolver {
    registry: Arc<PolicyRegistry>,
    store: Arc<dyn DataAccess>,
}

impl AbilityResolver {
    pub fn new(registry: Arc<PolicyRegistry>, store: Arc<dyn DataAccess>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn DataAccess {
        self.store.as_ref()
    }

    /// Is `ability` allowed for `subject` on `resource`?
    ///
    /// Walks the plan in order; every rule that mentions the ability is
    /// evaluated and the last satisfied one decides. Conditions of rules
    /// that do not mention the ability are never evaluated, and neither are
    /// the delegations only those rules need.
    pub async fn allowed(
        &self,
        ctx: &AuthorizationContext,
        subject: &Subject,
        resource: &Resource,
        ability: &str,
    ) -> PolicyResult<bool> {
        let ability = self.registry.ability(resource.kind(), ability)?;
        self.decide(ctx, subject, resource, ability, |_, _, _| {}).await
    }

    /// Every ability of the resource's type that is allowed, sharing one
    /// context cache across the individual decisions.
    pub async fn allowed_abilities(
        &self,
        ctx: &AuthorizationContext,
        subject: &Subject,
        resource: &Resource,
    ) -> PolicyResult<BTreeSet<Ability>> {
        let mut allowed = BTreeSet::new();
        for &ability in self.registry.abilities(resource.kind())? {
            if self.allowed(ctx, subject, resource, ability.as_str()).await? {
                allowed.insert(ability);
            }
        }
        Ok(allowed)
    }

    /// Same walk as [`allowed`], reporting the outcome of each rule.
    ///
    /// [`allowed`]: AbilityResolver::allowed
    pub async fn explain(
        &self,
        ctx: &AuthorizationContext,
        subject: &Subject,
        resource: &Resource,
        ability: &str,
    ) -> PolicyResult<Decision> {
        let ability = self.registry.ability(resource.kind(), ability)?;

        let mut trace = Vec::new();
        let allowed = self
            .decide(ctx, subject, resource, ability, |planned, target, satisfied| {
                trace.push(RuleTrace {
                    policy: planned.policy,
                    rule: planned.index,
                    resource: target.identity(),
                    condition: planned.rule.condition.to_string(),
                    effect: planned.rule.effect,
                    satisfied,
                });
            })
            .await?;

        Ok(Decision {
            ability,
            resource: resource.identity(),
            allowed,
            trace,
        })
    }

    async fn decide<F>(
        &self,
        ctx: &AuthorizationContext,
        subject: &Subject,
        resource: &Resource,
        ability: Ability,
        mut visit: F,
    ) -> PolicyResult<bool>
    where
        F: FnMut(&PlannedRule, &Resource, bool) + Send,
    {
        let plan = self.registry.plan(resource.kind())?;

        let mut decided_by: Option<&PlannedRule> = None;
        for planned in plan.iter().filter(|p| p.rule.affects(ability)) {
            let target = self.resolve_path(ctx, resource, &planned.path).await?;
            let policy = self.registry.policy(planned.policy)?;
            let satisfied = self
                .evaluate_expr(ctx, subject, &target, policy, &planned.rule.condition)
                .await?;
            visit(planned, &*target, satisfied);
            if satisfied {
                decided_by = Some(planned);
            }
        }

        match decided_by {
            Some(planned) => {
                let allowed = planned.rule.effect.is_enable();
                tracing::debug!(
                    subject = %subject,
                    resource = %resource,
                    ability = %ability,
                    policy = %planned.policy,
                    rule = planned.index,
                    allowed,
                    "rule matched"
                );
                Ok(allowed)
            }
            None => {
                tracing::debug!(
                    subject = %subject,
                    resource = %resource,
                    ability = %ability,
                    "no rule matched, denying"
                );
                Ok(false)
            }
        }
    }

    /// Immediate delegated resources of `resource`, in declaration order.
    pub async fn delegates(
        &self,
        ctx: &AuthorizationContext,
        resource: &Resource,
    ) -> PolicyResult<Vec<Arc<Resource>>> {
        let policy = self.registry.policy(resource.kind())?;
        let mut out = Vec::with_capacity(policy.delegations().len());
        for delegation in policy.delegations() {
            out.push(self.follow(ctx, resource, delegation).await?);
        }
        Ok(out)
    }

    async fn resolve_path<'a>(
        &self,
        ctx: &AuthorizationContext,
        root: &'a Resource,
        path: &[usize],
    ) -> PolicyResult<Target<'a>> {
        let mut current = Target::Root(root);
        for &index in path {
            let policy = self.registry.policy(current.kind())?;
            let delegation = policy.delegations().get(index).ok_or_else(|| {
                PolicyError::configuration(format!(
                    "{} policy has no delegation #{index}",
                    policy.kind()
                ))
            })?;
            let next = self.follow(ctx, &current, delegation).await?;
            current = Target::Delegated(next);
        }
        Ok(current)
    }

    async fn follow(
        &self,
        ctx: &AuthorizationContext,
        source: &Resource,
        delegation: &Delegation,
    ) -> PolicyResult<Arc<Resource>> {
        let identity = source.identity();
        ctx.delegate(identity, delegation.name, || async {
            let resolved = delegation
                .accessor
                .resolve(source, &ContextStore::new(ctx, self.store.as_ref()))
                .await
                .and_then(|resolved| {
                    if resolved.kind() == delegation.target {
                        Ok(resolved)
                    } else {
                        Err(DataAccessError::UnexpectedResource {
                            expected: delegation.target,
                            found: resolved.kind(),
                        })
                    }
                })
                .map_err(|source| PolicyError::Delegation {
                    delegation: delegation.name.to_string(),
                    resource: identity,
                    source,
                })?;
            tracing::trace!(
                from = %identity,
                delegation = delegation.name,
                to = %resolved,
                "delegation resolved"
            );
            Ok(Arc::new(resolved))
        })
        .await
    }

    fn evaluate_expr<'a>(
        &'a self,
        ctx: &'a AuthorizationContext,
        subject: &'a Subject,
        resource: &'a Resource,
        policy: &'a Policy,
        expr: &'a ConditionExpr,
    ) -> BoxFuture<'a, PolicyResult<bool>> {
        Box::pin(async move {
            match expr {
                ConditionExpr::Ref(name) => {
                    self.evaluate_condition(ctx, subject, resource, policy, *name)
                        .await
                }
                ConditionExpr::All(items) => {
                    for item in items {
                        if !self.evaluate_expr(ctx, subject, resource, policy, item).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                ConditionExpr::Any(items) => {
                    for item in items {
                        if self.evaluate_expr(ctx, subject, resource, policy, item).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                ConditionExpr::Not(inner) => {
                    let value = self
                        .evaluate_expr(ctx, subject, resource, policy, inner)
                        .await?;
                    Ok(!value)
                }
            }
        })
    }

    async fn evaluate_condition(
        &self,
        ctx: &AuthorizationContext,
        subject: &Subject,
        resource: &Resource,
        policy: &Policy,
        name: &'static str,
    ) -> PolicyResult<bool> {
        let condition = policy.condition(name)?;
        let key = CacheKey::new(policy.kind(), name, condition.scope, subject, resource);

        ctx.evaluate(key, || async {
            let outcome = condition
                .predicate
                .evaluate(subject, resource, &ContextStore::new(ctx, self.store.as_ref()))
                .await
                .map_err(|source| PolicyError::Evaluation {
                    condition: format!("{}.{name}", policy.kind()),
                    source,
                })?;
            tracing::trace!(
                policy = %policy.kind(),
                condition = name,
                resource = %resource,
                outcome,
                "condition evaluated"
            );
            Ok(outcome)
        })
        .await
    }
}
