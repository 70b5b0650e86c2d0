mod support;

use std::fs;

use predicates::str::contains;
use serde_json::Value;

use support::TestProject;

fn context(project: &TestProject) -> Value {
    project.json(&["context", "show"])["data"].clone()
}

#[test]
fn empty_project_has_empty_context() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    let ctx = context(&project);
    assert!(ctx["activeSprint"].is_null());
    assert_eq!(ctx["recentLabels"], serde_json::json!([]));
    assert_eq!(ctx["focusedTasks"], serde_json::json!([]));

    Ok(())
}

#[test]
fn active_sprint_defaults_new_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    let value = project.json(&["context", "sprint", "sprint-7"]);
    assert_eq!(value["data"]["activeSprint"], "sprint-7");

    let implicit = project.new_task("Inherits sprint", &[]);
    assert_eq!(project.show_task(&implicit)["sprint"], "sprint-7");

    let explicit = project.new_task("Own sprint", &["--sprint", "sprint-9"]);
    assert_eq!(project.show_task(&explicit)["sprint"], "sprint-9");

    project.json(&["context", "sprint", "--clear"]);
    let after = project.new_task("No sprint", &[]);
    assert!(project.show_task(&after).get("sprint").is_none());

    Ok(())
}

#[test]
fn sprint_requires_name_or_clear() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    project
        .cmd()
        .args(["context", "sprint"])
        .assert()
        .code(2)
        .stderr(contains("--clear"));

    Ok(())
}

#[test]
fn task_labels_feed_recent_labels() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    project.new_task("Labeled", &["-l", "api", "-l", "db"]);
    project.json(&["context", "label", "ui"]);
    project.json(&["context", "label", "api"]);

    let labels = context(&project)["recentLabels"].clone();
    let labels: Vec<&str> = labels
        .as_array()
        .expect("labels")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(labels[0], "api");
    assert_eq!(labels[1], "ui");
    assert_eq!(labels.len(), 3);

    Ok(())
}

#[test]
fn recent_labels_are_capped_by_config() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.write_config("[context]\nmax_recent_labels = 2\n")?;

    for label in ["a", "b", "c"] {
        project.json(&["context", "label", label]);
    }

    assert_eq!(context(&project)["recentLabels"], serde_json::json!(["c", "b"]));

    Ok(())
}

#[test]
fn invalidate_resets_one_field() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.json(&["context", "sprint", "s1"]);
    project.json(&["context", "label", "keep-me"]);

    let value = project.json(&["context", "invalidate", "active-sprint"]);
    assert!(value["data"]["activeSprint"].is_null());
    assert_eq!(value["data"]["recentLabels"], serde_json::json!(["keep-me"]));

    project
        .cmd()
        .args(["context", "invalidate", "everything"])
        .assert()
        .code(2);

    Ok(())
}

#[test]
fn expired_fields_read_as_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.write_config("[context]\nactive_sprint_ttl = \"0s\"\n")?;

    project.json(&["context", "sprint", "fleeting"]);
    assert!(context(&project)["activeSprint"].is_null());

    Ok(())
}

#[test]
fn focus_and_unfocus_edit_the_focus_list() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task("Watch me", &[]);

    let focused = project.json(&["context", "focus", &id]);
    assert_eq!(focused["data"]["focusedTasks"], serde_json::json!([id]));
    assert_eq!(project.show_task(&id)["status"], "todo");

    let unfocused = project.json(&["context", "unfocus", &id]);
    assert_eq!(unfocused["data"]["focusedTasks"], serde_json::json!([]));

    Ok(())
}

#[test]
fn corrupt_context_file_is_replaced_with_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    fs::write(project.data_dir().join("context.json"), "{ not json")?;

    let ctx = context(&project);
    assert!(ctx["activeSprint"].is_null());

    project.json(&["context", "sprint", "recovered"]);
    assert_eq!(context(&project)["activeSprint"], "recovered");

    Ok(())
}

#[test]
fn deleting_a_task_drops_it_from_focus() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task("Doomed", &[]);
    project.json(&["context", "focus", &id]);

    project.json(&["task", "delete", &id]);

    assert_eq!(context(&project)["focusedTasks"], serde_json::json!([]));

    Ok(())
}
