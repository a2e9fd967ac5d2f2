use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::data_access::{DataAccess, DataAccessError};
use super::resource::{Resource, ResourceKind};

/// Loads the related resource whose policy a delegation defers to.
#[async_trait]
pub trait Delegate: Send + Sync {
    async fn resolve(
        &self,
        resource: &Resource,
        store: &dyn DataAccess,
    ) -> Result<Resource, DataAccessError>;
}

/// A declared edge in the delegation graph.
#[derive(Clone)]
pub struct Delegation {
    pub name: &'static str,
    pub target: ResourceKind,
    pub accessor: Arc<dyn Delegate>,
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
