use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::authz::{DataAccess, DataAccessError, ResourceKind};
use crate::models::{AccessLevel, Build, Namespace, Pipeline, Project, ProtectedBranch};

#[derive(Debug, Default)]
struct Records {
    namespaces: HashMap<Uuid, Namespace>,
    projects: HashMap<Uuid, Project>,
    pipelines: HashMap<Uuid, Pipeline>,
    builds: HashMap<Uuid, Build>,
    members: HashMap<(Uuid, Uuid), AccessLevel>,
    protected_branches: Vec<ProtectedBranch>,
}

/// In-process [`DataAccess`] for tests and demos.
///
/// Counts every lookup so callers can check how often the engine reaches
/// for data.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_namespace(&self, namespace: Namespace) {
        self.write().namespaces.insert(namespace.id, namespace);
    }

    pub fn insert_project(&self, project: Project) {
        self.write().projects.insert(project.id, project);
    }

    pub fn insert_pipeline(&self, pipeline: Pipeline) {
        self.write().pipelines.insert(pipeline.id, pipeline);
    }

    pub fn insert_build(&self, build: Build) {
        self.write().builds.insert(build.id, build);
    }

    pub fn add_member(&self, project_id: Uuid, user_id: Uuid, level: AccessLevel) {
        self.write().members.insert((project_id, user_id), level);
    }

    pub fn insert_protected_branch(&self, branch: ProtectedBranch) {
        self.write().protected_branches.push(branch);
    }

    /// Total number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Records> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DataAccess for MemoryStore {
    async fn namespace(&self, id: Uuid) -> Result<Namespace, DataAccessError> {
        self.read()
            .namespaces
            .get(&id)
            .cloned()
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Namespace, id))
    }

    async fn project(&self, id: Uuid) -> Result<Project, DataAccessError> {
        self.read()
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Project, id))
    }

    async fn pipeline(&self, id: Uuid) -> Result<Pipeline, DataAccessError> {
        self.read()
            .pipelines
            .get(&id)
            .cloned()
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Pipeline, id))
    }

    async fn build(&self, id: Uuid) -> Result<Build, DataAccessError> {
        self.read()
            .builds
            .get(&id)
            .cloned()
            .ok_or_else(|| DataAccessError::not_found(ResourceKind::Build, id))
    }

    async fn access_level(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AccessLevel>, DataAccessError> {
        let records = self.read();
        let owns_namespace = records
            .projects
            .get(&project_id)
            .and_then(|project| records.namespaces.get(&project.namespace_id))
            .is_some_and(|namespace| namespace.is_owned_by(user_id));
        if owns_namespace {
            return Ok(Some(AccessLevel::Owner));
        }
        Ok(records.members.get(&(project_id, user_id)).copied())
    }

    async fn protected_branches(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProtectedBranch>, DataAccessError> {
        Ok(self
            .read()
            .protected_branches
            .iter()
            .filter(|branch| branch.project_id == project_id)
            .cloned()
            .collect())
    }
}
