//! Per-request cache scope.
//!
//! An [`AuthorizationContext`] memoizes condition outcomes, delegated
//! resources and the data-access lookups behind them for one logical
//! request. It is never shared between
//! unrelated requests; dropping it releases everything it holds.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::condition::ConditionScope;
use super::data_access::{DataAccess, DataAccessError};
use super::resource::{Resource, ResourceId, ResourceKind};
use super::subject::{Subject, SubjectKey};
use crate::models::{AccessLevel, Build, Namespace, Pipeline, Project, ProtectedBranch};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    policy: ResourceKind,
    condition: &'static str,
    subject: Option<SubjectKey>,
    resource: Option<ResourceId>,
}

impl CacheKey {
    /// Builds the key for `condition` of `policy`, keeping only the inputs
    /// its scope depends on.
    pub fn new(
        policy: ResourceKind,
        condition: &'static str,
        scope: ConditionScope,
        subject: &Subject,
        resource: &Resource,
    ) -> Self {
        Self {
            policy,
            condition,
            subject: scope.uses_subject().then(|| subject.cache_key()),
            resource: scope.uses_resource().then(|| resource.identity()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DelegateKey {
    source: ResourceId,
    delegation: &'static str,
}

type Slots<K, V> = Mutex<HashMap<K, Arc<OnceCell<V>>>>;

#[derive(Debug, Default)]
struct Lookups {
    namespaces: Slots<Uuid, Namespace>,
    projects: Slots<Uuid, Project>,
    pipelines: Slots<Uuid, Pipeline>,
    builds: Slots<Uuid, Build>,
    access_levels: Slots<(Uuid, Uuid), Option<AccessLevel>>,
    protected_branches: Slots<Uuid, Vec<ProtectedBranch>>,
}

#[derive(Debug, Default)]
pub struct AuthorizationContext {
    conditions: Slots<CacheKey, bool>,
    delegates: Slots<DelegateKey, Arc<Resource>>,
    lookups: Lookups,
}

impl AuthorizationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached outcome for `key`, running `compute` on the first
    /// call only. Concurrent callers for the same key wait for one
    /// computation. Errors are returned and not cached.
    pub async fn evaluate<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let cell = slot(&self.conditions, key);
        let value = cell.get_or_try_init(compute).await?;
        Ok(*value)
    }

    pub(crate) async fn delegate<F, Fut, E>(
        &self,
        source: ResourceId,
        delegation: &'static str,
        resolve: F,
    ) -> Result<Arc<Resource>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Resource>, E>>,
    {
        let cell = slot(&self.delegates, DelegateKey { source, delegation });
        let value = cell.get_or_try_init(resolve).await?;
        Ok(Arc::clone(value))
    }

    /// Number of condition outcomes currently cached.
    pub fn cached_conditions(&self) -> usize {
        initialized(&self.conditions)
    }

    /// Number of delegated resources currently cached.
    pub fn cached_delegates(&self) -> usize {
        initialized(&self.delegates)
    }
}

/// [`DataAccess`] view that answers each distinct lookup once per context,
/// however many conditions and delegations ask for it.
pub(crate) struct ContextStore<'a> {
    ctx: &'a AuthorizationContext,
    inner: &'a dyn DataAccess,
}

impl<'a> ContextStore<'a> {
    pub(crate) fn new(ctx: &'a AuthorizationContext, inner: &'a dyn DataAccess) -> Self {
        Self { ctx, inner }
    }
}

#[async_trait]
impl<'a> DataAccess for ContextStore<'a> {
    async fn namespace(&self, id: Uuid) -> Result<Namespace, DataAccessError> {
        remember(&self.ctx.lookups.namespaces, id, || self.inner.namespace(id)).await
    }

    async fn project(&self, id: Uuid) -> Result<Project, DataAccessError> {
        remember(&self.ctx.lookups.projects, id, || self.inner.project(id)).await
    }

    async fn pipeline(&self, id: Uuid) -> Result<Pipeline, DataAccessError> {
        remember(&self.ctx.lookups.pipelines, id, || self.inner.pipeline(id)).await
    }

    async fn build(&self, id: Uuid) -> Result<Build, DataAccessError> {
        remember(&self.ctx.lookups.builds, id, || self.inner.build(id)).await
    }

    async fn access_level(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AccessLevel>, DataAccessError> {
        remember(&self.ctx.lookups.access_levels, (project_id, user_id), || {
            self.inner.access_level(project_id, user_id)
        })
        .await
    }

    async fn protected_branches(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProtectedBranch>, DataAccessError> {
        remember(&self.ctx.lookups.protected_branches, project_id, || {
            self.inner.protected_branches(project_id)
        })
        .await
    }
}

async fn remember<K, V, F, Fut>(slots: &Slots<K, V>, key: K, load: F) -> Result<V, DataAccessError>
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, DataAccessError>>,
{
    let cell = slot(slots, key);
    let value = cell.get_or_try_init(load).await?;
    Ok(value.clone())
}

fn slot<K: Eq + Hash, V>(slots: &Slots<K, V>, key: K) -> Arc<OnceCell<V>> {
    let mut map = slots.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(key).or_default())
}

fn initialized<K, V>(slots: &Slots<K, V>) -> usize {
    let map = slots.lock().unwrap_or_else(PoisonError::into_inner);
    map.values().filter(|cell| cell.initialized()).count()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use uuid::Uuid;

    use super::*;
    use crate::models::Project;

    fn project() -> Resource {
        Resource::from(Project::new(Uuid::new_v4(), "demo"))
    }

    #[tokio::test]
    async fn computes_each_key_once() {
        let ctx = AuthorizationContext::new();
        let calls = AtomicUsize::new(0);
        let subject = Subject::user(Uuid::new_v4());
        let resource = project();
        let key = CacheKey::new(
            ResourceKind::Project,
            "guest",
            ConditionScope::Both,
            &subject,
            &resource,
        );

        for _ in 0..3 {
            let value = ctx
                .evaluate(key.clone(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(true)
                })
                .await;
            assert_eq!(value, Ok(true));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.cached_conditions(), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let ctx = AuthorizationContext::new();
        let subject = Subject::anonymous();
        let resource = project();
        let key = CacheKey::new(
            ResourceKind::Project,
            "public_project",
            ConditionScope::ResourceOnly,
            &subject,
            &resource,
        );

        let failed = ctx
            .evaluate(key.clone(), || async { Err::<bool, _>("lookup failed") })
            .await;
        assert_eq!(failed, Err("lookup failed"));
        assert_eq!(ctx.cached_conditions(), 0);

        let retried = ctx.evaluate(key, || async { Ok::<_, &str>(false) }).await;
        assert_eq!(retried, Ok(false));
        assert_eq!(ctx.cached_conditions(), 1);
    }

    #[test]
    fn scope_controls_key_inputs() {
        let resource = project();
        let alice = Subject::user(Uuid::new_v4());
        let bob = Subject::user(Uuid::new_v4());

        let resource_only = |subject: &Subject| {
            CacheKey::new(
                ResourceKind::Project,
                "public_builds",
                ConditionScope::ResourceOnly,
                subject,
                &resource,
            )
        };
        assert_eq!(resource_only(&alice), resource_only(&bob));

        let both = |subject: &Subject| {
            CacheKey::new(
                ResourceKind::Project,
                "guest",
                ConditionScope::Both,
                subject,
                &resource,
            )
        };
        assert_ne!(both(&alice), both(&bob));
    }

    #[test]
    fn equal_identities_share_keys() {
        let original = Project::new(Uuid::new_v4(), "demo");
        let copy = original.clone().with_public_builds(false);
        let subject = Subject::anonymous();

        let key = |project: &Project| {
            CacheKey::new(
                ResourceKind::Project,
                "public_project",
                ConditionScope::Both,
                &subject,
                &Resource::from(project.clone()),
            )
        };
        assert_eq!(key(&original), key(&copy));
    }

    #[tokio::test]
    async fn store_lookups_are_read_once_per_context() {
        let store = crate::db::MemoryStore::new();
        let project = Project::new(Uuid::new_v4(), "demo");
        let missing = Uuid::new_v4();
        store.insert_project(project.clone());

        let ctx = AuthorizationContext::new();
        let view = ContextStore::new(&ctx, &store);
        for _ in 0..3 {
            assert_eq!(view.project(project.id).await.expect("project").id, project.id);
        }
        assert_eq!(store.lookups(), 1);

        // misses are retried, not remembered
        assert!(view.project(missing).await.is_err());
        assert!(view.project(missing).await.is_err());
        assert_eq!(store.lookups(), 3);

        let other = AuthorizationContext::new();
        ContextStore::new(&other, &store).project(project.id).await.expect("project");
        assert_eq!(store.lookups(), 4);
    }
}
