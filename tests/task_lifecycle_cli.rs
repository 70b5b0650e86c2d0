mod support;

use std::fs;

use chrono::{DateTime, FixedOffset};
use predicates::str::contains;
use serde_json::Value;

use support::TestProject;

fn timestamp(value: &Value) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value.as_str().expect("timestamp")).expect("rfc3339")
}

fn ids(list: &Value) -> Vec<String> {
    list["data"]["tasks"]
        .as_array()
        .expect("tasks array")
        .iter()
        .map(|task| task["id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn task_new_applies_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    let value = project.json(&["task", "new", "Write parser"]);
    assert_eq!(value["command"], "task new");
    let task = &value["data"];
    assert!(task["id"].as_str().unwrap_or_default().starts_with("crit-"));
    assert_eq!(task["status"], "todo");
    assert_eq!(task["priority"], "medium");
    assert_eq!(task["createdAt"], task["updatedAt"]);

    let id = task["id"].as_str().expect("id");
    assert!(project
        .data_dir()
        .join("tasks")
        .join(format!("{id}.json"))
        .is_file());

    Ok(())
}

#[test]
fn task_new_records_all_fields() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let parent = project.new_task("Epic", &[]);

    let task = project.json(&[
        "task",
        "new",
        "  Child task  ",
        "-d",
        "details",
        "-p",
        "high",
        "--assignee",
        "alice",
        "-l",
        "backend",
        "-l",
        "backend",
        "--points",
        "5",
        "--hours",
        "2.5",
        "--due",
        "2099-01-31",
        "--criterion",
        "tests pass",
        "--parent",
        &parent,
    ])["data"]
        .clone();

    assert_eq!(task["title"], "Child task");
    assert_eq!(task["description"], "details");
    assert_eq!(task["priority"], "high");
    assert_eq!(task["assignee"], "alice");
    assert_eq!(task["labels"], serde_json::json!(["backend"]));
    assert_eq!(task["storyPoints"], 5);
    assert_eq!(task["estimatedHours"], 2.5);
    assert!(task["dueDate"]
        .as_str()
        .unwrap_or_default()
        .starts_with("2099-01-31T23:59:59"));
    assert_eq!(task["acceptanceCriteria"][0]["description"], "tests pass");
    assert_eq!(task["acceptanceCriteria"][0]["done"], false);
    assert_eq!(task["parentId"], parent.as_str());

    Ok(())
}

#[test]
fn task_new_reports_every_validation_error() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    let value = project.json_err(
        &[
            "task",
            "new",
            "   ",
            "--points",
            "0",
            "--depends-on",
            "crit-zzzz",
        ],
        2,
    );
    assert_eq!(value["error"]["kind"], "validation_error");
    let errors = value["error"]["details"]["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .map(|error| error.as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert!(errors.iter().any(|e| e.starts_with("title:")));
    assert!(errors.iter().any(|e| e.starts_with("storyPoints:")));
    assert!(errors.iter().any(|e| e.contains("crit-zzzz")));

    assert_eq!(project.json(&["task", "list"])["data"]["total"], 0);

    Ok(())
}

#[test]
fn task_new_rejects_past_due_date() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    project
        .cmd()
        .args(["task", "new", "Late", "--due", "2001-01-01"])
        .assert()
        .code(2)
        .stderr(contains("dueDate"));

    Ok(())
}

#[test]
fn task_new_strips_terminal_escapes() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task(
        "\u{1b}[31mAlert\u{1b}[0m title",
        &["-d", "first\n\u{1b}]0;title\u{7}second"],
    );

    let task = project.show_task(&id);
    assert_eq!(task["title"], "Alert title");
    assert_eq!(task["description"], "first\nsecond");

    Ok(())
}

#[test]
fn task_show_accepts_unique_prefix() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task("Prefixed", &[]);
    let suffix = id.split_once('-').map(|(_, s)| s).unwrap_or(&id);

    let shown = project.show_task(&suffix[..3]);
    assert_eq!(shown["id"], id.as_str());

    project
        .cmd()
        .args(["task", "show", "crit-nope"])
        .assert()
        .code(2)
        .stderr(contains("Task not found"));

    Ok(())
}

#[test]
fn task_list_filters_sorts_and_pages() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let low = project.new_task("Low", &["-p", "low", "-l", "ui"]);
    let critical = project.new_task("Critical", &["-p", "critical", "-l", "ui"]);
    let medium = project.new_task("Medium", &["--assignee", "bob"]);
    let draft = project.new_task("Draft", &["--draft"]);

    let all = project.json(&["task", "list"]);
    assert_eq!(ids(&all), vec![critical.clone(), medium.clone(), low.clone()]);

    let labeled = project.json(&["task", "list", "-l", "ui", "--sort", "title"]);
    assert_eq!(ids(&labeled), vec![critical.clone(), low.clone()]);

    let desc = project.json(&["task", "list", "--desc"]);
    assert_eq!(ids(&desc), vec![low.clone(), medium.clone(), critical.clone()]);

    let assigned = project.json(&["task", "list", "--assignee", "bob"]);
    assert_eq!(ids(&assigned), vec![medium.clone()]);

    let page = project.json(&["task", "list", "--offset", "1", "--limit", "1"]);
    assert_eq!(ids(&page), vec![medium.clone()]);

    let with_drafts = project.json(&["task", "list", "--drafts"]);
    assert!(ids(&with_drafts).contains(&draft));

    let searched = project.json(&["task", "list", "--search", "CRIT"]);
    assert_eq!(ids(&searched), vec![critical.clone()]);
    let by_assignee = project.json(&["task", "list", "-s", "bob"]);
    assert_eq!(ids(&by_assignee), vec![medium.clone()]);
    let by_label = project.json(&["task", "list", "--search", "UI", "--sort", "title"]);
    assert_eq!(ids(&by_label), vec![critical.clone(), low.clone()]);

    project
        .cmd()
        .args(["task", "list", "--sort", "nonsense"])
        .assert()
        .code(2);

    Ok(())
}

#[test]
fn task_edit_patches_fields_and_bumps_updated_at() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task("Original", &["-l", "old", "--criterion", "first"]);
    let before = project.show_task(&id);

    let edited = project.json(&[
        "task",
        "edit",
        &id,
        "--title",
        "Renamed",
        "--add-label",
        "new",
        "--remove-label",
        "old",
        "--complete-criterion",
        "1",
        "--sprint",
        "s1",
    ])["data"]
        .clone();

    assert_eq!(edited["title"], "Renamed");
    assert_eq!(edited["labels"], serde_json::json!(["new"]));
    assert_eq!(edited["acceptanceCriteria"][0]["done"], true);
    assert_eq!(edited["sprint"], "s1");
    assert_eq!(edited["status"], "todo");
    assert_eq!(edited["createdAt"], before["createdAt"]);
    assert!(timestamp(&edited["updatedAt"]) > timestamp(&before["updatedAt"]));

    let cleared = project.json(&["task", "edit", &id, "--clear-sprint"])["data"].clone();
    assert!(cleared.get("sprint").is_none());

    Ok(())
}

#[test]
fn task_edit_without_fields_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task("Untouched", &[]);

    project
        .cmd()
        .args(["task", "edit", &id])
        .assert()
        .code(2)
        .stderr(contains("nothing to edit"));

    Ok(())
}

#[test]
fn task_edit_rejects_dependency_cycles() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let first = project.new_task("First", &[]);
    let second = project.new_task("Second", &["--depends-on", &first]);

    project
        .cmd()
        .args(["task", "edit", &first, "--depends-on", &second])
        .assert()
        .code(2)
        .stderr(contains("cycle"));

    Ok(())
}

#[test]
fn task_delete_detaches_references() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let base = project.new_task("Base", &[]);
    let child = project.new_task("Child", &["--parent", &base, "--depends-on", &base]);

    let value = project.json(&["task", "delete", &base]);
    assert_eq!(value["data"]["id"], base.as_str());

    let child = project.show_task(&child);
    assert!(child.get("parentId").is_none());
    assert!(child.get("dependencies").is_none());

    project
        .cmd()
        .args(["task", "delete", &base])
        .assert()
        .code(2);

    Ok(())
}

#[test]
fn task_archive_hides_from_default_list() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let id = project.new_task("Old news", &[]);

    let archived = project.json(&["task", "archive", &id])["data"].clone();
    let archived_at = archived["archivedAt"].clone();
    assert!(archived_at.is_string());

    assert_eq!(project.json(&["task", "list"])["data"]["total"], 0);
    assert_eq!(project.json(&["task", "list", "--all"])["data"]["total"], 1);
    let by_status = project.json(&["task", "list", "--status", "archived"]);
    assert_eq!(ids(&by_status), vec![id.clone()]);

    let again = project.json(&["task", "archive", &id])["data"].clone();
    assert_eq!(again["archivedAt"], archived_at);

    Ok(())
}

#[test]
fn task_stats_counts_by_status() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    project.new_task("One", &[]);
    let two = project.new_task("Two", &[]);
    project.new_task("Three", &["--draft"]);
    project.json(&["task", "archive", &two]);

    let stats = project.json(&["task", "stats"])["data"].clone();
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["archived"], 1);
    assert_eq!(stats["drafts"], 1);
    let count = |status: &str| {
        stats["by_status"]
            .as_array()
            .expect("by_status")
            .iter()
            .find(|entry| entry["status"] == status)
            .map(|entry| entry["count"].clone())
    };
    assert_eq!(count("archived"), Some(Value::from(1)));
    assert_eq!(count("todo"), Some(Value::from(2)));

    Ok(())
}

#[test]
fn events_flag_writes_jsonl() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let events_path = project.path().join("events.jsonl");
    let events_arg = events_path.to_string_lossy().to_string();

    project
        .cmd()
        .args(["task", "new", "Observed", "--events", &events_arg])
        .assert()
        .success();

    let contents = fs::read_to_string(&events_path)?;
    let event: Value = serde_json::from_str(contents.lines().next().unwrap_or_default())?;
    assert_eq!(event["schema_version"], "crit.event.v1");
    assert_eq!(event["event"], "task_created");
    assert_eq!(event["data"]["title"], "Observed");

    Ok(())
}

#[test]
fn events_on_stdout_replace_regular_output() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;

    let output = project
        .cmd()
        .args(["task", "new", "Streamed", "--events", "-"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let event: Value = serde_json::from_str(lines[0])?;
    assert_eq!(event["event"], "task_created");

    Ok(())
}
