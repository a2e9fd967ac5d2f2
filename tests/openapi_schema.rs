use serde_json::Value;

#[test]
fn openapi_describes_decision_traces() -> anyhow::Result<()> {
    let doc = ci_policy::docs::build_openapi()?;
    let v = serde_json::to_value(&doc)?;

    let schemas = v
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
        .expect("components.schemas must exist");

    let decision = schemas
        .get("Decision")
        .and_then(|d| d.get("properties"))
        .and_then(Value::as_object)
        .expect("components.schemas.Decision.properties must exist");
    for key in ["ability", "resource", "allowed", "trace"] {
        assert!(decision.contains_key(key), "Decision schema missing '{key}'");
    }
    assert_eq!(decision["ability"]["type"], "string");

    let trace = schemas
        .get("RuleTrace")
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .expect("components.schemas.RuleTrace.properties must exist");
    for key in ["policy", "rule", "resource", "condition", "effect", "satisfied"] {
        assert!(trace.contains_key(key), "RuleTrace schema missing '{key}'");
    }

    let effects = schemas["Effect"]["enum"].as_array().expect("Effect is an enum");
    assert_eq!(effects, &vec![Value::from("enable"), Value::from("prevent")]);

    Ok(())
}
