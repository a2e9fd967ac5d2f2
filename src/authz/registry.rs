//! Rule registry.
//!
//! Policies are declared once at startup through [`PolicyBuilder`] and
//! validated by [`RegistryBuilder::build`]. The resulting [`PolicyRegistry`]
//! is immutable and safe to share across threads.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::condition::{Condition, ConditionExpr, ConditionScope, RegisteredCondition};
use super::delegation::{Delegate, Delegation};
use super::error::{PolicyError, PolicyResult};
use super::resource::ResourceKind;
use super::rule::{Ability, Effect, Rule};

#[derive(Debug)]
pub struct Policy {
    kind: ResourceKind,
    abilities: BTreeSet<Ability>,
    conditions: HashMap<&'static str, RegisteredCondition>,
    delegations: Vec<Delegation>,
    rules: Vec<Rule>,
}

impl Policy {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Abilities this policy declares itself, excluding delegated ones.
    pub fn abilities(&self) -> &BTreeSet<Ability> {
        &self.abilities
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn delegations(&self) -> &[Delegation] {
        &self.delegations
    }

    pub fn condition(&self, name: &str) -> PolicyResult<&RegisteredCondition> {
        self.conditions.get(name).ok_or_else(|| {
            PolicyError::configuration(format!(
                "{} policy has no condition named `{name}`",
                self.kind
            ))
        })
    }
}

/// Typed declaration of one policy.
///
/// ```
/// use ci_policy::authz::{cond, condition_fn, PolicyBuilder, ResourceKind};
/// use ci_policy::policies::abilities::UPDATE_BUILD;
///
/// let builder = PolicyBuilder::new(ResourceKind::Build)
///     .abilities([UPDATE_BUILD])
///     .condition("locked", condition_fn(|_, _| Ok(true)))
///     .rule(cond("locked"))
///     .prevent([UPDATE_BUILD]);
/// # let _ = builder;
/// ```
pub struct PolicyBuilder {
    kind: ResourceKind,
    abilities: Vec<Ability>,
    conditions: Vec<RegisteredCondition>,
    delegations: Vec<Delegation>,
    rules: Vec<Rule>,
}

impl PolicyBuilder {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            abilities: Vec::new(),
            conditions: Vec::new(),
            delegations: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn abilities(mut self, abilities: impl IntoIterator<Item = Ability>) -> Self {
        self.abilities.extend(abilities);
        self
    }

    pub fn condition(self, name: &'static str, condition: impl Condition + 'static) -> Self {
        self.scoped_condition(name, ConditionScope::Both, condition)
    }

    pub fn scoped_condition(
        mut self,
        name: &'static str,
        scope: ConditionScope,
        condition: impl Condition + 'static,
    ) -> Self {
        self.conditions.push(RegisteredCondition {
            name,
            scope,
            predicate: Arc::new(condition),
        });
        self
    }

    /// Defers to the policy of the resource `accessor` loads. Delegated
    /// rules are evaluated before this policy's own rules.
    pub fn delegate(
        mut self,
        name: &'static str,
        target: ResourceKind,
        accessor: impl Delegate + 'static,
    ) -> Self {
        self.delegations.push(Delegation {
            name,
            target,
            accessor: Arc::new(accessor),
        });
        self
    }

    pub fn rule(self, condition: impl Into<ConditionExpr>) -> RuleDecl {
        RuleDecl {
            builder: self,
            condition: condition.into(),
        }
    }

    fn push_rule(mut self, condition: ConditionExpr, abilities: Vec<Ability>, effect: Effect) -> Self {
        self.rules.push(Rule {
            condition,
            abilities,
            effect,
        });
        self
    }

    fn into_policy(self) -> PolicyResult<Policy> {
        let kind = self.kind;
        let abilities: BTreeSet<Ability> = self.abilities.into_iter().collect();

        let mut conditions = HashMap::new();
        for condition in self.conditions {
            let name = condition.name;
            if conditions.insert(name, condition).is_some() {
                return Err(PolicyError::configuration(format!(
                    "{kind} policy declares condition `{name}` twice"
                )));
            }
        }

        let mut delegation_names = HashSet::new();
        for delegation in &self.delegations {
            if !delegation_names.insert(delegation.name) {
                return Err(PolicyError::configuration(format!(
                    "{kind} policy declares delegation `{}` twice",
                    delegation.name
                )));
            }
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.abilities.is_empty() {
                return Err(PolicyError::configuration(format!(
                    "{kind} policy rule #{index} ({}) affects no abilities",
                    rule.condition
                )));
            }
            for name in rule.condition.names() {
                if !conditions.contains_key(name) {
                    return Err(PolicyError::configuration(format!(
                        "{kind} policy rule #{index} references undeclared condition `{name}`"
                    )));
                }
            }
            for ability in &rule.abilities {
                if !abilities.contains(ability) {
                    return Err(PolicyError::configuration(format!(
                        "{kind} policy rule #{index} names undeclared ability `{ability}`"
                    )));
                }
            }
        }

        Ok(Policy {
            kind,
            abilities,
            conditions,
            delegations: self.delegations,
            rules: self.rules,
        })
    }
}

/// A rule waiting for its effect: `.rule(cond).enable([..])`.
pub struct RuleDecl {
    builder: PolicyBuilder,
    condition: ConditionExpr,
}

impl RuleDecl {
    pub fn enable(self, abilities: impl IntoIterator<Item = Ability>) -> PolicyBuilder {
        self.builder
            .push_rule(self.condition, abilities.into_iter().collect(), Effect::Enable)
    }

    pub fn prevent(self, abilities: impl IntoIterator<Item = Ability>) -> PolicyBuilder {
        self.builder
            .push_rule(self.condition, abilities.into_iter().collect(), Effect::Prevent)
    }
}

/// A rule placed in the flattened evaluation order of some policy type.
#[derive(Debug, Clone)]
pub struct PlannedRule {
    /// Policy that declared the rule.
    pub policy: ResourceKind,
    /// Position of the rule within its declaring policy.
    pub index: usize,
    /// Delegation indices to follow from the queried resource.
    pub path: Vec<usize>,
    pub rule: Rule,
}

#[derive(Default)]
pub struct RegistryBuilder {
    policies: Vec<PolicyBuilder>,
}

impl RegistryBuilder {
    pub fn policy(mut self, policy: PolicyBuilder) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn build(self) -> PolicyResult<PolicyRegistry> {
        let mut policies = HashMap::new();
        for builder in self.policies {
            let policy = builder.into_policy()?;
            let kind = policy.kind;
            if policies.insert(kind, policy).is_some() {
                return Err(PolicyError::configuration(format!(
                    "policy for {kind} resources registered twice"
                )));
            }
        }

        for policy in policies.values() {
            for delegation in &policy.delegations {
                if !policies.contains_key(&delegation.target) {
                    return Err(PolicyError::configuration(format!(
                        "{} policy delegates `{}` to unregistered {} policy",
                        policy.kind, delegation.name, delegation.target
                    )));
                }
            }
        }

        check_acyclic(&policies)?;

        let mut plans = HashMap::new();
        let mut vocabularies = HashMap::new();
        for &kind in policies.keys() {
            let mut plan = Vec::new();
            flatten(&policies, kind, &mut Vec::new(), &mut plan);
            plans.insert(kind, plan);

            let mut vocabulary = BTreeSet::new();
            collect_abilities(&policies, kind, &mut vocabulary);
            vocabularies.insert(kind, vocabulary);
        }

        tracing::debug!(policies = policies.len(), "policy registry built");

        Ok(PolicyRegistry {
            policies,
            plans,
            vocabularies,
        })
    }
}

#[derive(Debug)]
pub struct PolicyRegistry {
    policies: HashMap<ResourceKind, Policy>,
    plans: HashMap<ResourceKind, Vec<PlannedRule>>,
    vocabularies: HashMap<ResourceKind, BTreeSet<Ability>>,
}

impl PolicyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn policy(&self, kind: ResourceKind) -> PolicyResult<&Policy> {
        self.policies
            .get(&kind)
            .ok_or(PolicyError::UnknownResourceType(kind))
    }

    /// Own rules of a policy type, in declaration order.
    pub fn rules(&self, kind: ResourceKind) -> PolicyResult<&[Rule]> {
        Ok(self.policy(kind)?.rules())
    }

    pub fn delegations(&self, kind: ResourceKind) -> PolicyResult<&[Delegation]> {
        Ok(self.policy(kind)?.delegations())
    }

    /// Full evaluation order: delegated rules first (recursively, in
    /// delegation order), then the policy's own rules.
    pub fn plan(&self, kind: ResourceKind) -> PolicyResult<&[PlannedRule]> {
        self.plans
            .get(&kind)
            .map(Vec::as_slice)
            .ok_or(PolicyError::UnknownResourceType(kind))
    }

    /// Every ability that may be asked of a resource of this type.
    pub fn abilities(&self, kind: ResourceKind) -> PolicyResult<&BTreeSet<Ability>> {
        self.vocabularies
            .get(&kind)
            .ok_or(PolicyError::UnknownResourceType(kind))
    }

    pub fn ability(&self, kind: ResourceKind, name: &str) -> PolicyResult<Ability> {
        self.abilities(kind)?
            .get(name)
            .copied()
            .ok_or_else(|| PolicyError::unknown_ability(kind, name))
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.policies.keys().copied()
    }
}

fn check_acyclic(policies: &HashMap<ResourceKind, Policy>) -> PolicyResult<()> {
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();

    let mut kinds: Vec<ResourceKind> = policies.keys().copied().collect();
    kinds.sort();
    for kind in kinds {
        visit(policies, kind, &mut visiting, &mut visited, &mut Vec::new())?;
    }
    Ok(())
}

fn visit(
    policies: &HashMap<ResourceKind, Policy>,
    kind: ResourceKind,
    visiting: &mut HashSet<ResourceKind>,
    visited: &mut HashSet<ResourceKind>,
    stack: &mut Vec<ResourceKind>,
) -> PolicyResult<()> {
    if visited.contains(&kind) {
        return Ok(());
    }
    if visiting.contains(&kind) {
        stack.push(kind);
        let path: Vec<&str> = stack.iter().map(ResourceKind::as_str).collect();
        return Err(PolicyError::configuration(format!(
            "delegation cycle: {}",
            path.join(" -> ")
        )));
    }

    visiting.insert(kind);
    stack.push(kind);

    if let Some(policy) = policies.get(&kind) {
        for delegation in &policy.delegations {
            visit(policies, delegation.target, visiting, visited, stack)?;
        }
    }

    visiting.remove(&kind);
    visited.insert(kind);
    stack.pop();
    Ok(())
}

// Callers guarantee the graph is acyclic and every target is registered.
fn flatten(
    policies: &HashMap<ResourceKind, Policy>,
    kind: ResourceKind,
    path: &mut Vec<usize>,
    out: &mut Vec<PlannedRule>,
) {
    let Some(policy) = policies.get(&kind) else {
        return;
    };

    for (i, delegation) in policy.delegations.iter().enumerate() {
        path.push(i);
        flatten(policies, delegation.target, path, out);
        path.pop();
    }

    out.extend(policy.rules.iter().enumerate().map(|(index, rule)| PlannedRule {
        policy: kind,
        index,
        path: path.clone(),
        rule: rule.clone(),
    }));
}

fn collect_abilities(
    policies: &HashMap<ResourceKind, Policy>,
    kind: ResourceKind,
    out: &mut BTreeSet<Ability>,
) {
    let Some(policy) = policies.get(&kind) else {
        return;
    };
    out.extend(policy.abilities.iter().copied());
    for delegation in &policy.delegations {
        collect_abilities(policies, delegation.target, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::condition::{cond, condition_fn};
    use crate::authz::data_access::{DataAccess, DataAccessError};
    use crate::authz::resource::Resource;
    use async_trait::async_trait;

    const READ: Ability = Ability::new("read");
    const WRITE: Ability = Ability::new("write");
    const ARCHIVE: Ability = Ability::new("archive");

    struct Unreachable;

    #[async_trait]
    impl Delegate for Unreachable {
        async fn resolve(
            &self,
            _resource: &Resource,
            _store: &dyn DataAccess,
        ) -> Result<Resource, DataAccessError> {
            Err(DataAccessError::backend("not used in registry tests"))
        }
    }

    fn yes() -> impl Condition {
        condition_fn(|_, _| Ok(true))
    }

    fn error_message(result: PolicyResult<PolicyRegistry>) -> String {
        match result {
            Err(PolicyError::Configuration(message)) => message,
            Err(other) => panic!("expected configuration error, got {other}"),
            Ok(_) => panic!("expected configuration error, registry was built"),
        }
    }

    #[test]
    fn keeps_declaration_order() {
        let registry = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Project)
                    .abilities([READ, WRITE])
                    .condition("a", yes())
                    .condition("b", yes())
                    .rule(cond("a"))
                    .enable([READ, WRITE])
                    .rule(cond("b"))
                    .prevent([WRITE]),
            )
            .build()
            .expect("valid registry");

        let rules = registry.rules(ResourceKind::Project).expect("project rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].effect, Effect::Enable);
        assert_eq!(rules[1].effect, Effect::Prevent);
        assert_eq!(rules[1].abilities, vec![WRITE]);
    }

    #[test]
    fn delegated_rules_come_first_in_the_plan() {
        let registry = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Namespace)
                    .abilities([ARCHIVE])
                    .condition("owner", yes())
                    .rule(cond("owner"))
                    .enable([ARCHIVE]),
            )
            .policy(
                PolicyBuilder::new(ResourceKind::Project)
                    .abilities([READ])
                    .condition("member", yes())
                    .delegate("namespace", ResourceKind::Namespace, Unreachable)
                    .rule(cond("member"))
                    .enable([READ]),
            )
            .policy(
                PolicyBuilder::new(ResourceKind::Build)
                    .abilities([WRITE])
                    .condition("locked", yes())
                    .delegate("project", ResourceKind::Project, Unreachable)
                    .rule(cond("locked"))
                    .prevent([WRITE]),
            )
            .build()
            .expect("valid registry");

        let plan = registry.plan(ResourceKind::Build).expect("build plan");
        let order: Vec<(ResourceKind, Vec<usize>)> =
            plan.iter().map(|p| (p.policy, p.path.clone())).collect();
        assert_eq!(
            order,
            vec![
                (ResourceKind::Namespace, vec![0, 0]),
                (ResourceKind::Project, vec![0]),
                (ResourceKind::Build, vec![]),
            ]
        );

        let vocabulary = registry.abilities(ResourceKind::Build).expect("abilities");
        assert!(vocabulary.contains(&READ));
        assert!(vocabulary.contains(&ARCHIVE));
        assert!(registry.ability(ResourceKind::Build, "archive").is_ok());
        assert!(matches!(
            registry.ability(ResourceKind::Namespace, "write"),
            Err(PolicyError::UnknownAbility { .. })
        ));
    }

    #[test]
    fn rejects_undeclared_condition() {
        let result = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Project)
                    .abilities([READ])
                    .condition("a", yes())
                    .rule(cond("a") & !cond("missing"))
                    .enable([READ]),
            )
            .build();
        assert!(error_message(result).contains("undeclared condition `missing`"));
    }

    #[test]
    fn rejects_undeclared_ability() {
        let result = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Project)
                    .abilities([READ])
                    .condition("a", yes())
                    .rule(cond("a"))
                    .enable([WRITE]),
            )
            .build();
        assert!(error_message(result).contains("undeclared ability `write`"));
    }

    #[test]
    fn rejects_empty_ability_sets_and_duplicates() {
        let empty = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Project)
                    .condition("a", yes())
                    .rule(cond("a"))
                    .enable(Vec::<Ability>::new()),
            )
            .build();
        assert!(error_message(empty).contains("affects no abilities"));

        let twice = PolicyRegistry::builder()
            .policy(PolicyBuilder::new(ResourceKind::Project))
            .policy(PolicyBuilder::new(ResourceKind::Project))
            .build();
        assert!(error_message(twice).contains("registered twice"));

        let twice = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Project)
                    .condition("a", yes())
                    .condition("a", yes()),
            )
            .build();
        assert!(error_message(twice).contains("condition `a` twice"));
    }

    #[test]
    fn rejects_unregistered_delegation_target() {
        let result = PolicyRegistry::builder()
            .policy(
                PolicyBuilder::new(ResourceKind::Build).delegate(
                    "project",
                    ResourceKind::Project,
                    Unreachable,
                ),
            )
            .build();
        assert!(error_message(result).contains("unregistered project policy"));
    }

    #[test]
    fn rejects_delegation_cycles() {
        let result = PolicyRegistry::builder()
            .policy(PolicyBuilder::new(ResourceKind::Project).delegate(
                "pipeline",
                ResourceKind::Pipeline,
                Unreachable,
            ))
            .policy(PolicyBuilder::new(ResourceKind::Pipeline).delegate(
                "project",
                ResourceKind::Project,
                Unreachable,
            ))
            .build();
        let message = error_message(result);
        assert!(message.contains("delegation cycle"), "{message}");
        assert!(message.contains("project -> pipeline -> project"), "{message}");
    }

    #[test]
    fn unknown_kind_is_reported() {
        let registry = PolicyRegistry::builder().build().expect("empty registry");
        assert!(matches!(
            registry.plan(ResourceKind::Build),
            Err(PolicyError::UnknownResourceType(ResourceKind::Build))
        ));
    }
}
