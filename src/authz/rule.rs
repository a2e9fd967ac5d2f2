use std::borrow::Borrow;
use std::fmt;

use serde::{Serialize, Serializer};
use utoipa::ToSchema;

use super::condition::ConditionExpr;

/// A named capability such as `read_build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ability(&'static str);

impl Ability {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl Borrow<str> for Ability {
    fn borrow(&self) -> &str {
        self.0
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for Ability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Enable,
    Prevent,
}

impl Effect {
    pub fn is_enable(&self) -> bool {
        matches!(self, Effect::Enable)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Enable => f.pad("enable"),
            Effect::Prevent => f.pad("prevent"),
        }
    }
}

/// `condition -> effect` on a set of abilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub condition: ConditionExpr,
    pub abilities: Vec<Ability>,
    pub effect: Effect,
}

impl Rule {
    pub fn affects(&self, ability: Ability) -> bool {
        self.abilities.contains(&ability)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [", self.condition, self.effect)?;
        for (i, ability) in self.abilities.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(ability.as_str())?;
        }
        f.write_str("]")
    }
}
