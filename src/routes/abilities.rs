use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Ability, AuthorizationContext, Decision, Resource, ResourceId, ResourceKind};
use crate::errors::{AppError, AppResult};
use crate::jwt::SessionSubject;

#[derive(Debug, Serialize, ToSchema)]
pub struct AbilitiesResponse {
    #[schema(example = "user:5b0c7a4e-8a4f-4f55-9a57-2f8ad1b0f3d4")]
    pub subject: String,
    pub resource: ResourceId,
    #[schema(value_type = Vec<String>, example = json!(["read_build", "read_project"]))]
    pub abilities: Vec<Ability>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AbilityCheckResponse {
    pub subject: String,
    pub resource: ResourceId,
    #[schema(value_type = String, example = "update_build")]
    pub ability: Ability,
    pub allowed: bool,
}

async fn load_resource(state: &AppState, kind: &str, id: Uuid) -> AppResult<Resource> {
    let kind = kind.parse::<ResourceKind>().map_err(AppError::bad_request)?;
    let resource = state.resolver.store().load(ResourceId::new(kind, id)).await?;
    Ok(resource)
}

#[utoipa::path(
    get,
    path = "/api/{resource}/{id}/abilities",
    tag = "Abilities",
    params(
        ("resource" = String, Path, description = "namespace, project, pipeline or build"),
        ("id" = Uuid, Path, description = "Resource id")
    ),
    responses(
        (status = 200, description = "Abilities the caller holds", body = AbilitiesResponse),
        (status = 400, description = "Unknown resource type"),
        (status = 401, description = "Invalid bearer token"),
        (status = 404, description = "Resource not found")
    ),
    security((), ("bearerAuth" = []))
)]
pub async fn list_abilities(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    SessionSubject(subject): SessionSubject,
) -> AppResult<Json<AbilitiesResponse>> {
    let resource = load_resource(&state, &kind, id).await?;
    let ctx = AuthorizationContext::new();

    let abilities = state
        .resolver
        .allowed_abilities(&ctx, &subject, &resource)
        .await?;

    Ok(Json(AbilitiesResponse {
        subject: subject.to_string(),
        resource: resource.identity(),
        abilities: abilities.into_iter().collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/{resource}/{id}/abilities/{ability}",
    tag = "Abilities",
    params(
        ("resource" = String, Path, description = "namespace, project, pipeline or build"),
        ("id" = Uuid, Path, description = "Resource id"),
        ("ability" = String, Path, description = "Ability name, e.g. update_build")
    ),
    responses(
        (status = 200, description = "Whether the caller holds the ability", body = AbilityCheckResponse),
        (status = 400, description = "Unknown resource type or ability"),
        (status = 401, description = "Invalid bearer token"),
        (status = 404, description = "Resource not found")
    ),
    security((), ("bearerAuth" = []))
)]
pub async fn check_ability(
    State(state): State<AppState>,
    Path((kind, id, ability)): Path<(String, Uuid, String)>,
    SessionSubject(subject): SessionSubject,
) -> AppResult<Json<AbilityCheckResponse>> {
    let resource = load_resource(&state, &kind, id).await?;
    let ability = state.resolver.registry().ability(resource.kind(), &ability)?;
    let ctx = AuthorizationContext::new();

    let allowed = state
        .resolver
        .allowed(&ctx, &subject, &resource, ability.as_str())
        .await?;

    Ok(Json(AbilityCheckResponse {
        subject: subject.to_string(),
        resource: resource.identity(),
        ability,
        allowed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/{resource}/{id}/abilities/{ability}/explain",
    tag = "Abilities",
    params(
        ("resource" = String, Path, description = "namespace, project, pipeline or build"),
        ("id" = Uuid, Path, description = "Resource id"),
        ("ability" = String, Path, description = "Ability name, e.g. update_build")
    ),
    responses(
        (status = 200, description = "Decision with the rules that were evaluated", body = Decision),
        (status = 400, description = "Unknown resource type or ability"),
        (status = 401, description = "Invalid bearer token"),
        (status = 404, description = "Resource not found")
    ),
    security((), ("bearerAuth" = []))
)]
pub async fn explain_ability(
    State(state): State<AppState>,
    Path((kind, id, ability)): Path<(String, Uuid, String)>,
    SessionSubject(subject): SessionSubject,
) -> AppResult<Json<Decision>> {
    let resource = load_resource(&state, &kind, id).await?;
    let ctx = AuthorizationContext::new();

    let decision = state.resolver.explain(&ctx, &subject, &resource, &ability).await?;

    Ok(Json(decision))
}
