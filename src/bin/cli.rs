use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use ci_policy::app::load_registry;
use ci_policy::authz::{AbilityResolver, AuthorizationContext, ResourceId, ResourceKind, Subject};
use ci_policy::db::{SqliteStore, StoreConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "ci-policy migration and authorization tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Decide a single ability
    Check {
        #[command(flatten)]
        target: Target,
        ability: String,
    },
    /// List every ability the subject holds on a resource
    Abilities {
        #[command(flatten)]
        target: Target,
    },
    /// Print every rule evaluated for an ability
    Explain {
        #[command(flatten)]
        target: Target,
        ability: String,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// namespace, project, pipeline or build
    kind: ResourceKind,
    id: Uuid,
    /// Acting user; anonymous when omitted
    #[arg(long)]
    user: Option<Uuid>,
    #[arg(long, requires = "user")]
    admin: bool,
}

impl Target {
    fn subject(&self) -> Subject {
        match self.user {
            Some(id) if self.admin => Subject::admin(id),
            Some(id) => Subject::user(id),
            None => Subject::anonymous(),
        }
    }

    fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.kind, self.id)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Check { target, ability } => {
            let resolver = get_resolver().await?;
            let resource = resolver
                .store()
                .load(target.resource_id())
                .await
                .with_context(|| format!("failed to load {}", target.resource_id()))?;
            let ctx = AuthorizationContext::new();
            let subject = target.subject();
            let allowed = resolver.allowed(&ctx, &subject, &resource, &ability).await?;
            println!("{} {} {}: {}", subject, ability, resource, if allowed { "allowed" } else { "denied" });
        }
        Commands::Abilities { target } => {
            let resolver = get_resolver().await?;
            let resource = resolver
                .store()
                .load(target.resource_id())
                .await
                .with_context(|| format!("failed to load {}", target.resource_id()))?;
            let ctx = AuthorizationContext::new();
            for ability in resolver.allowed_abilities(&ctx, &target.subject(), &resource).await? {
                println!("{}", ability);
            }
        }
        Commands::Explain { target, ability } => {
            let resolver = get_resolver().await?;
            let resource = resolver
                .store()
                .load(target.resource_id())
                .await
                .with_context(|| format!("failed to load {}", target.resource_id()))?;
            let ctx = AuthorizationContext::new();
            let decision = resolver.explain(&ctx, &target.subject(), &resource, &ability).await?;

            println!("{:<10} {:<5} {:<8} {:<10} {}", "Policy", "Rule", "Effect", "Satisfied", "Condition");
            for step in &decision.trace {
                println!(
                    "{:<10} {:<5} {:<8} {:<10} {}",
                    step.policy, step.rule, step.effect, step.satisfied, step.condition
                );
            }
            println!("{}: {}", decision.ability, if decision.allowed { "allowed" } else { "denied" });
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn get_resolver() -> anyhow::Result<AbilityResolver> {
    let pool = get_pool().await?;
    let registry = load_registry()?;
    let store = SqliteStore::new(pool, StoreConfig::from_env()?);
    Ok(AbilityResolver::new(registry, Arc::new(store)))
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let status = if applied_versions.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root, otherwise the
    // crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(args: &[&str]) -> Target {
        let cli = Cli::try_parse_from(args).expect("valid arguments");
        match cli.command {
            Commands::Check { target, .. } => target,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn check_target_builds_subject_and_resource() {
        let id = Uuid::new_v4();
        let user = Uuid::new_v4();

        let anonymous = target(&["cli", "check", "build", &id.to_string(), "read_build"]);
        assert_eq!(anonymous.subject(), Subject::anonymous());
        assert_eq!(anonymous.resource_id(), ResourceId::new(ResourceKind::Build, id));

        let admin = target(&[
            "cli",
            "check",
            "project",
            &id.to_string(),
            "admin_project",
            "--user",
            &user.to_string(),
            "--admin",
        ]);
        assert_eq!(admin.subject(), Subject::admin(user));
    }

    #[test]
    fn admin_flag_requires_a_user() {
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["cli", "check", "build", &id, "read_build", "--admin"]).is_err());
    }
}
