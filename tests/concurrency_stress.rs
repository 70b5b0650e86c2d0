mod support;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::Value;

use support::{crit_cmd, TestProject};

const WRITERS: usize = 6;

#[test]
fn concurrent_creates_get_unique_ids() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::init()?;
    let root: PathBuf = project.path().to_path_buf();
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let root = root.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let output = crit_cmd()
                    .current_dir(&root)
                    .args(["task", "new", &format!("parallel {n}"), "--json"])
                    .output()
                    .expect("run crit");
                assert!(output.status.success(), "{output:?}");
                let value: Value = serde_json::from_slice(&output.stdout).expect("json");
                value["data"]["id"].as_str().expect("id").to_string()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle.join().map_err(|_| "writer panicked")?;
        ids.insert(id);
    }
    assert_eq!(ids.len(), WRITERS);
    assert_eq!(project.json(&["task", "list"])["data"]["total"], WRITERS);

    Ok(())
}
