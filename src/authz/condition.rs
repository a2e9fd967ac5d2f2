use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use async_trait::async_trait;

use super::data_access::{DataAccess, DataAccessError};
use super::resource::Resource;
use super::subject::Subject;

/// A named predicate over `(subject, resource)`.
///
/// Results must be deterministic for a fixed pair within one authorization
/// context; they are cached per context.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn evaluate(
        &self,
        subject: &Subject,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<bool, DataAccessError>;
}

/// Which inputs a condition depends on. Narrower scopes share cache entries
/// more widely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConditionScope {
    #[default]
    Both,
    SubjectOnly,
    ResourceOnly,
}

impl ConditionScope {
    pub fn uses_subject(&self) -> bool {
        matches!(self, ConditionScope::Both | ConditionScope::SubjectOnly)
    }

    pub fn uses_resource(&self) -> bool {
        matches!(self, ConditionScope::Both | ConditionScope::ResourceOnly)
    }
}

/// Adapter for conditions that only inspect the records already in hand.
pub struct FnCondition<F>(pub F);

#[async_trait]
impl<F> Condition for FnCondition<F>
where
    F: Fn(&Subject, &Resource) -> Result<bool, DataAccessError> + Send + Sync,
{
    async fn evaluate(
        &self,
        subject: &Subject,
        resource: &Resource,
        _store: &dyn DataAccess,
    ) -> Result<bool, DataAccessError> {
        (self.0)(subject, resource)
    }
}

pub fn condition_fn<F>(f: F) -> FnCondition<F>
where
    F: Fn(&Subject, &Resource) -> Result<bool, DataAccessError> + Send + Sync,
{
    FnCondition(f)
}

#[derive(Clone)]
pub struct RegisteredCondition {
    pub name: &'static str,
    pub scope: ConditionScope,
    pub predicate: Arc<dyn Condition>,
}

impl fmt::Debug for RegisteredCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCondition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Boolean combination of named conditions, fixed at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionExpr {
    Ref(&'static str),
    All(Vec<ConditionExpr>),
    Any(Vec<ConditionExpr>),
    Not(Box<ConditionExpr>),
}

pub fn cond(name: &'static str) -> ConditionExpr {
    ConditionExpr::Ref(name)
}

impl ConditionExpr {
    /// Every condition name referenced by this expression.
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names(&self, out: &mut Vec<&'static str>) {
        match self {
            ConditionExpr::Ref(name) => out.push(*name),
            ConditionExpr::All(items) | ConditionExpr::Any(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
            ConditionExpr::Not(inner) => inner.collect_names(out),
        }
    }
}

impl From<&'static str> for ConditionExpr {
    fn from(name: &'static str) -> Self {
        ConditionExpr::Ref(name)
    }
}

impl BitAnd for ConditionExpr {
    type Output = ConditionExpr;

    fn bitand(self, rhs: ConditionExpr) -> ConditionExpr {
        match self {
            ConditionExpr::All(mut items) => {
                items.push(rhs);
                ConditionExpr::All(items)
            }
            lhs => ConditionExpr::All(vec![lhs, rhs]),
        }
    }
}

impl BitOr for ConditionExpr {
    type Output = ConditionExpr;

    fn bitor(self, rhs: ConditionExpr) -> ConditionExpr {
        match self {
            ConditionExpr::Any(mut items) => {
                items.push(rhs);
                ConditionExpr::Any(items)
            }
            lhs => ConditionExpr::Any(vec![lhs, rhs]),
        }
    }
}

impl Not for ConditionExpr {
    type Output = ConditionExpr;

    fn not(self) -> ConditionExpr {
        match self {
            ConditionExpr::Not(inner) => *inner,
            other => ConditionExpr::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[ConditionExpr], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                item.fmt(f)?;
            }
            f.write_str(")")
        }

        match self {
            ConditionExpr::Ref(name) => f.write_str(name),
            ConditionExpr::All(items) => join(f, items, "&"),
            ConditionExpr::Any(items) => join(f, items, "|"),
            ConditionExpr::Not(inner) => write!(f, "!{inner}"),
        }
    }
}
