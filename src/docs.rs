use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;

use crate::authz::{Decision, Effect, ResourceId, ResourceKind, RuleTrace};
use crate::routes::{abilities, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        abilities::list_abilities,
        abilities::check_ability,
        abilities::explain_ability
    ),
    components(
        schemas(
            health::HealthResponse,
            abilities::AbilitiesResponse,
            abilities::AbilityCheckResponse,
            Decision,
            RuleTrace,
            Effect,
            ResourceId,
            ResourceKind
        )
    ),
    tags(
        (name = "Health", description = "Service status"),
        (name = "Abilities", description = "Ability checks for CI resources")
    )
)]
pub struct ApiDoc;

/// The OpenAPI document served at `/api-docs/openapi.json`, with the bearer
/// scheme the ability routes accept.
pub fn build_openapi() -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    ensure_security_components(&mut doc);

    Ok(serde_json::from_value(doc)?)
}

pub fn routes(doc: &utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
    let doc_json = Arc::new(serde_json::to_value(doc)?);

    let json_route = get(move || {
        let doc_json = Arc::clone(&doc_json);
        async move { Json((*doc_json).clone()) }
    });

    Ok(Router::new().route("/api-docs/openapi.json", json_route))
}

fn ensure_security_components(doc: &mut Value) {
    let Some(root) = doc.as_object_mut() else {
        return;
    };
    let Some(components) = root
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
    else {
        return;
    };
    let Some(schemes) = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
    else {
        return;
    };

    schemes.entry("bearerAuth").or_insert_with(|| {
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        })
    });
}
