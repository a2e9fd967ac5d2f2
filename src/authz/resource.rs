use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::data_access::DataAccessError;
use crate::models::{Build, Namespace, Pipeline, Project};

/// Resource type; doubles as the policy type key in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Namespace,
    Project,
    Pipeline,
    Build,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Project => "project",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Build => "build",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    /// Accepts singular and plural forms (`build`, `builds`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.strip_suffix('s').unwrap_or(&s) {
            "namespace" => Ok(ResourceKind::Namespace),
            "project" => Ok(ResourceKind::Project),
            "pipeline" => Ok(ResourceKind::Pipeline),
            "build" => Ok(ResourceKind::Build),
            _ => Err(format!("unknown resource type: {s}")),
        }
    }
}

/// Identity of a resource. Cache keys use this, never the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub id: Uuid,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Namespace(Namespace),
    Project(Project),
    Pipeline(Pipeline),
    Build(Build),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Namespace(_) => ResourceKind::Namespace,
            Resource::Project(_) => ResourceKind::Project,
            Resource::Pipeline(_) => ResourceKind::Pipeline,
            Resource::Build(_) => ResourceKind::Build,
        }
    }

    pub fn identity(&self) -> ResourceId {
        let id = match self {
            Resource::Namespace(n) => n.id,
            Resource::Project(p) => p.id,
            Resource::Pipeline(p) => p.id,
            Resource::Build(b) => b.id,
        };
        ResourceId::new(self.kind(), id)
    }

    pub fn as_namespace(&self) -> Result<&Namespace, DataAccessError> {
        match self {
            Resource::Namespace(n) => Ok(n),
            other => Err(other.mismatch(ResourceKind::Namespace)),
        }
    }

    pub fn as_project(&self) -> Result<&Project, DataAccessError> {
        match self {
            Resource::Project(p) => Ok(p),
            other => Err(other.mismatch(ResourceKind::Project)),
        }
    }

    pub fn as_pipeline(&self) -> Result<&Pipeline, DataAccessError> {
        match self {
            Resource::Pipeline(p) => Ok(p),
            other => Err(other.mismatch(ResourceKind::Pipeline)),
        }
    }

    pub fn as_build(&self) -> Result<&Build, DataAccessError> {
        match self {
            Resource::Build(b) => Ok(b),
            other => Err(other.mismatch(ResourceKind::Build)),
        }
    }

    fn mismatch(&self, expected: ResourceKind) -> DataAccessError {
        DataAccessError::UnexpectedResource {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity().fmt(f)
    }
}

impl From<Namespace> for Resource {
    fn from(value: Namespace) -> Self {
        Resource::Namespace(value)
    }
}

impl From<Project> for Resource {
    fn from(value: Project) -> Self {
        Resource::Project(value)
    }
}

impl From<Pipeline> for Resource {
    fn from(value: Pipeline) -> Self {
        Resource::Pipeline(value)
    }
}

impl From<Build> for Resource {
    fn from(value: Build) -> Self {
        Resource::Build(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_route_segments() {
        assert_eq!("builds".parse::<ResourceKind>(), Ok(ResourceKind::Build));
        assert_eq!("Project".parse::<ResourceKind>(), Ok(ResourceKind::Project));
        assert!("runners".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn accessors_reject_other_kinds() {
        let project = Project::new(Uuid::new_v4(), "demo");
        let resource = Resource::from(project.clone());
        assert_eq!(resource.as_project().ok(), Some(&project));
        assert!(matches!(
            resource.as_build(),
            Err(DataAccessError::UnexpectedResource {
                expected: ResourceKind::Build,
                found: ResourceKind::Project
            })
        ));
    }
}
