use std::fs;

use crit::config::Config;
use crit::error::Error;

#[test]
fn config_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::load_from_root(dir.path()).expect("defaults");

    assert_eq!(config.actor.default, "unknown");
    assert_eq!(config.tasks.id_prefix, "crit");
    assert_eq!(config.tasks.fragmentation_limit, 2);
    assert_eq!(config.tasks.blocker_review_after, "3d");
    assert_eq!(config.context.active_sprint_ttl, "7d");
    assert_eq!(config.context.recent_labels_ttl, "24h");
    assert_eq!(config.context.focused_tasks_ttl, "8h");
    assert_eq!(config.context.max_recent_labels, 10);
    assert_eq!(config.import.concurrency, 2);
}

#[test]
fn config_overrides_from_toml() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let toml = r#"
[actor]
default = "agent-1"

[tasks]
id_prefix = "cc"
id_min_len = 6
fragmentation_limit = 4
blocker_review_after = "12h"

[context]
active_sprint_ttl = "14d"
max_recent_labels = 5

[import]
concurrency = 8
max_attempts = 5
"#;
    fs::write(dir.path().join(".crit.toml"), toml)?;

    let config = Config::load_from_root(dir.path())?;

    assert_eq!(config.actor.default, "agent-1");
    assert_eq!(config.tasks.id_prefix, "cc");
    assert_eq!(config.tasks.id_min_len, 6);
    assert_eq!(config.tasks.fragmentation_limit, 4);
    assert_eq!(config.tasks.blocker_review_delay()?, chrono::Duration::hours(12));
    assert_eq!(config.context.active_sprint_ttl, "14d");
    assert_eq!(config.context.recent_labels_ttl, "24h");
    assert_eq!(config.context.max_recent_labels, 5);
    assert_eq!(config.import.concurrency, 8);
    assert_eq!(config.import.retry_policy().max_attempts, 5);

    Ok(())
}

#[test]
fn unknown_keys_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(".crit.toml"), "[tasks]\nfocus_limit = 1\n")?;

    let err = Config::load_from_root(dir.path()).expect_err("unknown key");
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(err.exit_code(), 2);

    Ok(())
}

#[test]
fn invalid_values_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(".crit.toml");

    for body in [
        "[tasks]\nid_prefix = \"\"\n",
        "[tasks]\nblocker_review_after = \"soon\"\n",
        "[context]\nrecent_labels_ttl = \"5y\"\n",
        "[context]\nmax_recent_labels = 0\n",
        "[import]\nconcurrency = 0\n",
        "[import]\nbackoff_factor = 0.5\n",
    ] {
        fs::write(&path, body)?;
        let err = Config::load(&path).expect_err(body);
        assert!(matches!(err, Error::InvalidConfig(_)), "{body}: {err}");
    }

    Ok(())
}

#[test]
fn huge_durations_are_config_errors() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(".crit.toml"),
        "[tasks]\nblocker_review_after = \"999999999999999d\"\n",
    )?;

    let err = Config::load_from_root(dir.path()).expect_err("out of range");
    assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
    assert_eq!(err.exit_code(), 2);

    Ok(())
}

#[test]
fn saved_config_loads_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(".crit.toml");

    let mut config = Config::default();
    config.tasks.fragmentation_limit = 7;
    config.save(&path)?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded.tasks.fragmentation_limit, 7);

    Ok(())
}
