#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Empty temp directory; `crit init` has not run.
    pub fn empty() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Temp directory with `crit init` applied.
    pub fn init() -> Result<Self, Box<dyn std::error::Error>> {
        let project = Self::empty()?;
        project.cmd().arg("init").assert().success();
        Ok(project)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join(".crit")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(".crit.toml", contents)
    }

    /// `crit` run from the project directory with a clean environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = crit_cmd();
        cmd.current_dir(self.path());
        cmd
    }

    /// Run a command with `--json` and return the parsed envelope.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("json envelope")
    }

    /// Run a failing command with `--json` and return the parsed error envelope.
    pub fn json_err(&self, args: &[&str], code: i32) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .code(code)
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("json error envelope")
    }

    pub fn new_task(&self, title: &str, extra: &[&str]) -> String {
        let mut args = vec!["task", "new", title];
        args.extend_from_slice(extra);
        let value = self.json(&args);
        value["data"]["id"].as_str().expect("task id").to_string()
    }

    pub fn show_task(&self, id: &str) -> Value {
        self.json(&["task", "show", id])["data"].clone()
    }

    pub fn set_state(&self, id: &str, status: &str, extra: &[&str]) -> Value {
        let mut args = vec!["task", "state", id, status];
        args.extend_from_slice(extra);
        self.json(&args)
    }
}

pub fn crit_cmd() -> Command {
    let mut cmd = Command::cargo_bin("crit").expect("crit binary");
    cmd.env_remove("CRIT_ACTOR")
        .env_remove("CRIT_ROOT")
        .env_remove("RUST_LOG");
    cmd
}
