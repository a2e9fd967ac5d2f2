use super::data_access::DataAccessError;
use super::resource::{ResourceId, ResourceKind};

pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    /// Invalid policy declarations; raised while building the registry.
    #[error("policy configuration error: {0}")]
    Configuration(String),
    #[error("no policy is registered for {0} resources")]
    UnknownResourceType(ResourceKind),
    #[error("ability `{ability}` is not declared for {kind} resources")]
    UnknownAbility { kind: ResourceKind, ability: String },
    #[error("condition `{condition}` could not be evaluated")]
    Evaluation {
        condition: String,
        #[source]
        source: DataAccessError,
    },
    #[error("delegation `{delegation}` of {resource} could not be resolved")]
    Delegation {
        delegation: String,
        resource: ResourceId,
        #[source]
        source: DataAccessError,
    },
}

impl PolicyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unknown_ability(kind: ResourceKind, ability: impl Into<String>) -> Self {
        Self::UnknownAbility {
            kind,
            ability: ability.into(),
        }
    }

    /// True for failures of the data behind a decision, as opposed to
    /// mistakes at the call site or in the declarations.
    pub fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation { .. } | Self::Delegation { .. })
    }
}
