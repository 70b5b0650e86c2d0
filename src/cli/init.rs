//! crit init command implementation
//!
//! Creates the `.crit/` data directory and a default `.crit.toml`.

use std::path::{Path, PathBuf};

use crate::cli::GlobalOptions;
use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::storage::{Storage, DATA_DIR};

/// Per-machine state that should stay out of version control.
const LOCAL_IGNORES: [&str; 4] = [".lock", "*.tmp.*", "actor", "context.json"];

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    data_dir: bool,
    gitignore: bool,
}

pub fn run(global: &GlobalOptions) -> Result<()> {
    let root = match &global.root {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    if root.exists() && !root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "project root is not a directory: {}",
            root.display()
        )));
    }

    let storage = Storage::new(&root);
    let created_data_dir = !storage.is_initialized();
    storage.init()?;
    let created_gitignore = ensure_local_gitignore(&storage.data_dir())?;
    let created_config = ensure_config(&root)?;

    let report = InitReport {
        root: root.clone(),
        created: InitCreated {
            config: created_config,
            data_dir: created_data_dir,
            gitignore: created_gitignore,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(CONFIG_FILE.to_string());
    }
    if created_data_dir {
        created_items.push(format!("{DATA_DIR}/"));
    }
    if created_gitignore {
        created_items.push(format!("{DATA_DIR}/.gitignore"));
    }

    let header = if created_items.is_empty() {
        "crit init: nothing to do".to_string()
    } else {
        "crit init: initialized project".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("root", super::display_path(&root));
    human.push_summary(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.push_next_step("crit actor set <name>");
    human.push_next_step("crit task new \"<title>\"");

    emit_success(global.output(), "init", &report, Some(&human))
}

fn ensure_config(root: &Path) -> Result<bool> {
    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::OperationFailed(format!(
                "{CONFIG_FILE} exists but is not a file: {}",
                config_path.display()
            )));
        }
        // An existing config must still parse.
        Config::load(&config_path)?;
        return Ok(false);
    }

    Config::default().save(&config_path)?;
    Ok(true)
}

fn ensure_local_gitignore(data_dir: &Path) -> Result<bool> {
    let path = data_dir.join(".gitignore");
    if path.exists() {
        return Ok(false);
    }
    let mut content = LOCAL_IGNORES.join("\n");
    content.push('\n');
    std::fs::write(&path, content)?;
    Ok(true)
}
