use buildscript::buildscript::expression::ExpressionCodec;
use buildscript::buildscript::registry::FunctionRegistry;
use buildscript::buildscript::{format_timestamp, parse_timestamp};
use buildscript::{
    BuildScript, Comparator, PlatformId, Requirement, RequirementKind, ScriptError,
    VersionConstraint, parse_build_expression, to_build_expression, to_text,
};
use serde_json::json;

const BASIC_EXPRESSION: &str = r#"{
  "let": {
    "in": "$runtime",
    "runtime": {
      "state_tool_artifacts": {
        "src": "$sources"
      }
    },
    "sources": {
      "solve": {
        "at_time": "$at_time",
        "platforms": [
          "12345",
          "67890"
        ],
        "requirements": [
          {
            "name": "python",
            "namespace": "language",
            "version_requirements": [
              {
                "comparator": "eq",
                "version": "3.10.10"
              }
            ]
          }
        ],
        "solver_version": null
      }
    }
  }
}"#;

#[test]
fn canonical_expression_round_trips_byte_identical() {
    let script = parse_build_expression(BASIC_EXPRESSION.as_bytes(), None).unwrap();
    assert_eq!(script.at_time(), None);
    assert_eq!(to_build_expression(&script).unwrap(), BASIC_EXPRESSION);
}

#[test]
fn expression_converts_to_text() {
    let at_time = parse_timestamp("2000-01-01T00:00:00Z").unwrap();
    let script = parse_build_expression(BASIC_EXPRESSION.as_bytes(), Some(at_time)).unwrap();

    assert_eq!(
        to_text(&script),
        "at_time = \"2000-01-01T00:00:00.000Z\"\n\
\n\
runtime = state_tool_artifacts(\n\
\tsrc = sources\n\
)\n\
sources = solve(\n\
\tat_time = at_time,\n\
\tplatforms = [\n\
\t\t\"12345\",\n\
\t\t\"67890\"\n\
\t],\n\
\trequirements = [\n\
\t\tReq(name = \"python\", namespace = \"language\", version = Eq(value = \"3.10.10\"))\n\
\t],\n\
\tsolver_version = null\n\
)\n\
\n\
main = runtime"
    );
    assert_eq!(
        script.requirements().unwrap(),
        vec![
            Requirement::new("python", "language")
                .with_version(vec![VersionConstraint::new(Comparator::Eq, "3.10.10")])
        ]
    );
    assert_eq!(
        script.platforms().unwrap(),
        vec![PlatformId::from("12345"), PlatformId::from("67890")]
    );
}

#[test]
fn text_and_expression_agree() {
    let script = parse_build_expression(BASIC_EXPRESSION.as_bytes(), None).unwrap();
    let from_text = BuildScript::from_text(&to_text(&script)).unwrap();
    assert_eq!(from_text, script);
    assert!(from_text.equals(&script).unwrap());
}

#[test]
fn concrete_timestamp_is_lifted_and_overridable() {
    let payload = json!({
        "let": {
            "in": "$runtime",
            "runtime": { "solve": {
                "at_time": "2022-02-02T02:02:02.222999Z",
                "platforms": [],
                "requirements": []
            } }
        }
    })
    .to_string();

    let script = parse_build_expression(payload.as_bytes(), None).unwrap();
    assert_eq!(
        script.at_time().map(|t| format_timestamp(&t)),
        Some("2022-02-02T02:02:02.222Z".to_string())
    );
    let exported: serde_json::Value =
        serde_json::from_str(&to_build_expression(&script).unwrap()).unwrap();
    assert_eq!(
        exported.pointer("/let/runtime/solve/at_time"),
        Some(&json!("$at_time"))
    );

    let explicit = parse_timestamp("2030-01-01T00:00:00.000Z").unwrap();
    let script = parse_build_expression(payload.as_bytes(), Some(explicit)).unwrap();
    assert_eq!(script.at_time(), Some(explicit));
}

#[test]
fn multi_constraint_requirement_round_trips() {
    let payload = json!({
        "let": {
            "in": "$runtime",
            "runtime": { "solve": {
                "at_time": "$at_time",
                "platforms": [],
                "requirements": [
                    { "name": "numpy", "namespace": "language/python",
                      "version_requirements": [
                        { "comparator": "gt", "version": "1.0" },
                        { "comparator": "ne", "version": "2.0" },
                        { "comparator": "lt", "version": "3.0" }
                      ] },
                    { "name": "pandas", "namespace": "language/python", "revision": 3 }
                ]
            } }
        }
    });
    let script = parse_build_expression(payload.to_string().as_bytes(), None).unwrap();

    assert!(to_text(&script).contains(
        "version = And(left = Gt(value = \"1.0\"), right = And(left = Ne(value = \"2.0\"), right = Lt(value = \"3.0\")))"
    ));
    let requirements = script.requirements().unwrap();
    assert_eq!(requirements[0].version_requirement.as_ref().map(Vec::len), Some(3));
    assert_eq!(requirements[1].revision, Some(3));

    let exported: serde_json::Value =
        serde_json::from_str(&to_build_expression(&script).unwrap()).unwrap();
    assert_eq!(exported, payload);
}

#[test]
fn revisions_and_unknown_calls_are_typed() {
    let script = BuildScript::from_text(
        r#"runtime = solve(
	platforms = [],
	requirements = [
		Revision(name = "camel", revision_id = "abc-123"),
		ingredient(src = "git", ref = "main")
	]
)
main = runtime"#,
    )
    .unwrap();

    assert_eq!(
        script.all_requirements().unwrap(),
        vec![
            RequirementKind::Revision {
                name: "camel".to_string(),
                revision_id: "abc-123".to_string(),
            },
            RequirementKind::Unknown {
                name: "ingredient".to_string(),
                value: "src = \"git\", ref = \"main\"".to_string(),
            },
        ]
    );

    let exported: serde_json::Value =
        serde_json::from_str(&to_build_expression(&script).unwrap()).unwrap();
    assert_eq!(
        exported.pointer("/let/runtime/solve/requirements"),
        Some(&json!([
            { "name": "camel", "revision_id": "abc-123" },
            { "ingredient": { "ref": "main", "src": "git" } }
        ]))
    );
}

#[test]
fn empty_registry_exports_plain_calls() {
    let script = BuildScript::from_text(
        "runtime = solve(requirements = [Req(name = \"perl\", namespace = \"language\")])\nmain = runtime",
    )
    .unwrap();
    let codec = ExpressionCodec::new(FunctionRegistry::empty());
    let exported: serde_json::Value =
        serde_json::from_str(&script.to_build_expression_with(&codec).unwrap()).unwrap();
    assert_eq!(
        exported.pointer("/let/runtime/solve/requirements/0"),
        Some(&json!({ "Req": { "name": "perl", "namespace": "language" } }))
    );
}

#[test]
fn malformed_payloads_are_rejected() {
    assert!(matches!(
        parse_build_expression(b"[]", None).unwrap_err(),
        ScriptError::InvalidExpression(_)
    ));
    assert!(matches!(
        parse_build_expression(b"{", None).unwrap_err(),
        ScriptError::Json(_)
    ));
}
