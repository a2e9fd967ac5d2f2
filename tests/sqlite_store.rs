use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use uuid::Uuid;

use ci_policy::authz::{AbilityResolver, AuthorizationContext, DataAccess, DataAccessError, ResourceId, ResourceKind, Subject};
use ci_policy::db::{SqliteStore, StoreConfig};
use ci_policy::models::{AccessLevel, Build, Namespace, Pipeline, Project, ProtectedBranch, Visibility};
use ci_policy::policies;

async fn migrated_pool(dir: &tempfile::TempDir) -> Result<SqlitePool> {
    let db_path = dir.path().join("authz.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;
    Ok(pool)
}

#[tokio::test]
async fn sqlite_store_round_trips_records() -> Result<()> {
    let dir = tempdir()?;
    let store = SqliteStore::new(migrated_pool(&dir).await?, StoreConfig::default());

    let owner = Uuid::new_v4();
    let namespace = Namespace::new("group").with_owner(owner);
    let project = Project::new(namespace.id, "app")
        .with_visibility(Visibility::Internal)
        .with_public_builds(false);
    let pipeline = Pipeline::new(project.id, "main").triggered_by(owner);
    let build = Build::new(&pipeline, "rspec");
    let branch = ProtectedBranch::developers_can_merge(project.id, "main");
    let member = Uuid::new_v4();

    store.insert_namespace(&namespace).await?;
    store.insert_project(&project).await?;
    store.insert_pipeline(&pipeline).await?;
    store.insert_build(&build).await?;
    store.insert_protected_branch(&branch).await?;
    store.add_member(project.id, member, AccessLevel::Guest).await?;
    store.add_member(project.id, member, AccessLevel::Developer).await?;

    assert_eq!(store.namespace(namespace.id).await?, namespace);
    assert_eq!(store.project(project.id).await?, project);
    assert_eq!(store.pipeline(pipeline.id).await?, pipeline);
    assert_eq!(store.build(build.id).await?, build);
    assert_eq!(store.protected_branches(project.id).await?, vec![branch]);

    assert_eq!(store.access_level(project.id, member).await?, Some(AccessLevel::Developer));
    assert_eq!(store.access_level(project.id, owner).await?, Some(AccessLevel::Owner));
    assert_eq!(store.access_level(project.id, Uuid::new_v4()).await?, None);

    let missing = store.load(ResourceId::new(ResourceKind::Build, Uuid::new_v4())).await;
    assert!(matches!(missing, Err(DataAccessError::NotFound { kind: ResourceKind::Build, .. })));
    Ok(())
}

#[tokio::test]
async fn sqlite_store_decides_branch_protection() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(SqliteStore::new(migrated_pool(&dir).await?, StoreConfig::default()));

    let namespace = Namespace::new("group");
    let project = Project::new(namespace.id, "app");
    let pipeline = Pipeline::new(project.id, "master");
    let build = Build::new(&pipeline, "deploy");
    let developer = Uuid::new_v4();

    store.insert_namespace(&namespace).await?;
    store.insert_project(&project).await?;
    store.insert_pipeline(&pipeline).await?;
    store.insert_build(&build).await?;
    store.add_member(project.id, developer, AccessLevel::Developer).await?;
    store
        .insert_protected_branch(&ProtectedBranch::no_one_can_push(project.id, "master"))
        .await?;

    let resolver = AbilityResolver::new(Arc::new(policies::registry()?), store.clone());
    let resource = store.load(ResourceId::new(ResourceKind::Build, build.id)).await?;
    let subject = Subject::user(developer);

    let ctx = AuthorizationContext::new();
    assert!(resolver.allowed(&ctx, &subject, &resource, "read_build").await?);
    assert!(!resolver.allowed(&ctx, &subject, &resource, "update_build").await?);

    let other_project = Project::new(namespace.id, "other");
    store.insert_project(&other_project).await?;
    store
        .insert_protected_branch(&ProtectedBranch::developers_can_push(other_project.id, "master"))
        .await?;
    let other_pipeline = Pipeline::new(other_project.id, "master");
    let other_build = Build::new(&other_pipeline, "deploy");
    store.insert_pipeline(&other_pipeline).await?;
    store.insert_build(&other_build).await?;
    store.add_member(other_project.id, developer, AccessLevel::Developer).await?;

    let ctx = AuthorizationContext::new();
    let resource = store.load(ResourceId::new(ResourceKind::Build, other_build.id)).await?;
    assert!(resolver.allowed(&ctx, &subject, &resource, "update_build").await?);
    Ok(())
}
