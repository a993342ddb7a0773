use buildscript::buildscript::merge::{conflict_diff, is_auto_merge_possible};
use buildscript::buildscript::project::Project;
use buildscript::{
    BuildScript, MergeStrategy, Operation, Requirement, RequirementChange, ScriptConfig,
    ScriptError, merge, parse_text,
};
use tempfile::TempDir;

fn perl_script(at_time: &str, platform: &str, modules: &[&str]) -> BuildScript {
    let mut requirements = vec!["Req(name = \"perl\", namespace = \"language\")".to_string()];
    requirements.extend(
        modules
            .iter()
            .map(|m| format!("Req(name = \"{}\", namespace = \"language/perl\")", m)),
    );
    parse_text(&format!(
        "at_time = \"{}\"\n\
         sources = solve(\n\
         \tat_time = at_time,\n\
         \tplatforms = [\"{}\"],\n\
         \trequirements = [{}],\n\
         \tsolver_version = null\n\
         )\n\
         runtime = state_tool_artifacts(src = sources)\n\
         main = runtime",
        at_time,
        platform,
        requirements.join(", ")
    ))
    .expect("script parses")
}

fn names(script: &BuildScript) -> Vec<String> {
    script
        .requirements()
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect()
}

fn add_json() -> MergeStrategy {
    MergeStrategy {
        overwrite_changes: vec![RequirementChange::new(
            Operation::Added,
            "language/perl",
            "JSON",
        )],
        conflicts: vec![],
    }
}

#[test]
fn merge_applies_strategy_and_keeps_later_timestamp() {
    let mut a = perl_script("2023-01-01T00:00:00.000Z", "linux", &["DateTime"]);
    let b = perl_script("2023-06-01T12:00:00.000Z", "linux", &["JSON"]);

    merge(&mut a, &b, &add_json()).unwrap();

    assert_eq!(names(&a), vec!["perl", "DateTime", "JSON"]);
    assert_eq!(a.at_time(), b.at_time());
    assert_eq!(
        a.requirements().unwrap()[2],
        Requirement::new("JSON", "language/perl")
    );
}

#[test]
fn merge_keeps_local_timestamp_when_later() {
    let mut a = perl_script("2024-01-01T00:00:00.000Z", "linux", &[]);
    let b = perl_script("2023-01-01T00:00:00.000Z", "linux", &[]);
    let before = a.at_time();

    merge(&mut a, &b, &MergeStrategy::default()).unwrap();
    assert_eq!(a.at_time(), before);
    assert_eq!(names(&a), vec!["perl"]);
}

#[test]
fn platform_difference_is_a_conflict() {
    let mut a = perl_script("2023-01-01T00:00:00.000Z", "linux", &["DateTime"]);
    let b = perl_script("2023-01-01T00:00:00.000Z", "windows", &["DateTime"]);
    let original = a.clone();

    assert!(!is_auto_merge_possible(&a, &b));
    let err = merge(&mut a, &b, &add_json()).unwrap_err();
    assert!(matches!(err, ScriptError::MergeConflict(_)));
    assert_eq!(a, original);

    let diff = conflict_diff(&a, &b);
    assert!(diff.contains("<<<<<<< local"));
    assert!(diff.contains("\"linux\""));
    assert!(diff.contains("======="));
    assert!(diff.contains("\"windows\""));
    assert!(diff.contains(">>>>>>> remote"));
}

#[test]
fn failing_change_aborts_merge() {
    let mut a = perl_script("2023-01-01T00:00:00.000Z", "linux", &[]);
    let b = perl_script("2023-01-01T00:00:00.000Z", "linux", &[]);
    let strategy = MergeStrategy {
        overwrite_changes: vec![RequirementChange::new(
            Operation::Removed,
            "language/perl",
            "Moose",
        )],
        conflicts: vec![],
    };

    let err = merge(&mut a, &b, &strategy).unwrap_err();
    assert!(err.is_requirement_not_found());
}

#[test]
fn project_merge_round_trip() {
    let temp = TempDir::new().unwrap();
    let project = Project::new(temp.path(), ScriptConfig::default());
    let local = perl_script("2023-01-01T00:00:00.000Z", "linux", &["DateTime"]);
    let remote = perl_script("2023-02-01T00:00:00.000Z", "linux", &["JSON"]);

    project.write(&local).unwrap();
    let mut merged = project.read().unwrap().expect("script exists");
    assert_eq!(merged, local);

    merged.merge(&remote, &add_json()).unwrap();
    project.write(&merged).unwrap();

    let reread = project.read().unwrap().unwrap();
    assert_eq!(names(&reread), vec!["perl", "DateTime", "JSON"]);
    assert_eq!(reread.at_time(), remote.at_time());
}

#[test]
fn project_conflict_diff_replaces_script() {
    let temp = TempDir::new().unwrap();
    let project = Project::new(temp.path(), ScriptConfig::default());
    let local = perl_script("2023-01-01T00:00:00.000Z", "linux", &[]);
    let remote = perl_script("2023-01-01T00:00:00.000Z", "macos", &[]);

    project.write_conflict_diff(&local, &remote).unwrap();
    let text = std::fs::read_to_string(project.script_path()).unwrap();
    assert!(text.starts_with("at_time = \"2023-01-01T00:00:00.000Z\""));
    assert!(text.contains("<<<<<<< local"));
    assert!(project.read().is_err());
}
