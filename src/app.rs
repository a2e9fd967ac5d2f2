use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AbilityResolver, PolicyRegistry};
use crate::db::{SqliteStore, StoreConfig};
use crate::docs;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::policies;
use crate::routes::{abilities, health};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub resolver: AbilityResolver,
    pub jwt: Arc<JwtConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, resolver: AbilityResolver, jwt: JwtConfig) -> Self {
        Self {
            pool,
            resolver,
            jwt: Arc::new(jwt),
        }
    }
}

/// Builds the policy registry and fails on any misconfigured policy.
pub fn load_registry() -> Result<Arc<PolicyRegistry>, AppError> {
    policies::registry()
        .map(Arc::new)
        .map_err(|err| AppError::configuration(err.to_string()))
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let registry = load_registry()?;
    let store = SqliteStore::new(pool.clone(), StoreConfig::from_env()?);
    let resolver = AbilityResolver::new(registry, Arc::new(store));

    let doc = docs::build_openapi()?;

    router(AppState::new(pool, resolver, jwt_config), &doc)
}

pub fn router(state: AppState, doc: &utoipa::openapi::OpenApi) -> Result<Router, AppError> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let ability_routes = Router::new()
        .route("/", get(abilities::list_abilities))
        .route("/:ability", get(abilities::check_ability))
        .route("/:ability/explain", get(abilities::explain_ability));

    Ok(Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/:resource/:id/abilities", ability_routes)
        .with_state(state)
        .merge(docs::routes(doc)?)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
