mod support;

use predicates::str::contains;

use support::TestProject;

#[test]
fn import_creates_tasks_from_objects_and_arrays() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.write_file(
        "single.json",
        r#"{ "title": "Lone task", "priority": "high", "labels": ["ops"] }"#,
    )?;
    project.write_file(
        "batch.json",
        r#"[
            { "title": "Batch one", "storyPoints": 3 },
            { "title": "Batch two", "acceptanceCriteria": ["reviewed"] }
        ]"#,
    )?;

    let value = project.json(&["task", "import", "single.json", "batch.json"]);
    let created = value["data"]["created"].as_array().expect("created");
    let titles: Vec<&str> = created
        .iter()
        .filter_map(|task| task["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Lone task", "Batch one", "Batch two"]);
    assert_eq!(created[0]["priority"], "high");
    assert_eq!(created[1]["storyPoints"], 3);
    assert_eq!(value["data"]["failures"], serde_json::json!([]));

    assert_eq!(project.json(&["task", "list"])["data"]["total"], 3);

    Ok(())
}

#[test]
fn import_reports_partial_failures_as_warnings() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.write_file(
        "mixed.json",
        r#"[
            { "title": "Good" },
            { "title": "" },
            { "title": "Sneaky", "status": "done" }
        ]"#,
    )?;

    let value = project.json(&["task", "import", "mixed.json", "missing.json"]);
    assert_eq!(value["data"]["created"].as_array().map(Vec::len), Some(1));
    let failures = value["data"]["failures"].as_array().expect("failures");
    assert_eq!(failures.len(), 3);
    assert!(failures
        .iter()
        .any(|failure| failure["source"] == "mixed.json#1"));
    assert!(failures
        .iter()
        .any(|failure| failure["source"] == "missing.json"));
    assert_eq!(value["warnings"].as_array().map(Vec::len), Some(3));

    Ok(())
}

#[test]
fn import_fails_when_nothing_was_created() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.write_file("broken.json", "{ this is not json")?;

    let value = project.json_err(&["task", "import", "broken.json"], 2);
    assert_eq!(value["error"]["kind"], "validation_error");
    assert!(value["error"]["details"]["errors"][0]
        .as_str()
        .unwrap_or_default()
        .starts_with("broken.json"));

    Ok(())
}

#[test]
fn import_applies_active_sprint() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.json(&["context", "sprint", "q3"]);
    project.write_file("one.json", r#"{ "title": "Sprinted" }"#)?;

    let value = project.json(&["task", "import", "one.json"]);
    assert_eq!(value["data"]["created"][0]["sprint"], "q3");

    Ok(())
}

#[test]
fn import_requires_a_file() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    project
        .cmd()
        .args(["task", "import"])
        .assert()
        .failure()
        .stderr(contains("required"));

    Ok(())
}
