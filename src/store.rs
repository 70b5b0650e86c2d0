//! Task store: durable CRUD over `.crit/tasks/<id>.json`.
//!
//! Every mutation takes the data directory lock and writes through
//! (atomic temp-file + rename) before returning, so a read issued after a
//! write always observes it within a single process.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::iter::Peekable;
use std::str::Chars;

use chrono::Utc;
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::TasksConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::task::{
    AcceptanceCriterion, NewTask, Pagination, Task, TaskFilter, TaskPatch, TaskSort, TaskStats,
    TaskStatus,
};
use crate::transition::TransitionRecord;

const ULID_TIME_LEN: usize = 10;
const ULID_RANDOM_LEN: usize = 16;
const ID_ATTEMPTS_PER_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct TaskStore {
    storage: Storage,
    config: TasksConfig,
}

impl TaskStore {
    pub fn new(storage: Storage, config: TasksConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &TasksConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Validate `input`, assign an id and timestamps, and persist.
    ///
    /// All field problems are reported together in [`Error::Validation`].
    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        self.storage.locked(|| {
            let existing = self.load_all()?;
            let by_id: HashMap<&str, &Task> =
                existing.iter().map(|task| (task.id.as_str(), task)).collect();

            let mut errors = Vec::new();
            let title = self.check_title(&input.title, &mut errors);
            if let Some(status) = input.status {
                if status != TaskStatus::Todo {
                    errors.push(format!(
                        "status: new tasks start as todo (got {status}); use a state change"
                    ));
                }
            }
            check_story_points(input.story_points, &mut errors);
            check_estimated_hours(input.estimated_hours, &mut errors);
            if let Some(due) = input.due_date {
                if due < Utc::now() {
                    errors.push(format!("dueDate: {} is in the past", due.to_rfc3339()));
                }
            }
            let labels = normalize_labels(&input.labels, &mut errors);
            let criteria = normalize_criteria(&input.acceptance_criteria, &mut errors);
            let parent_id = non_empty(input.parent_id.as_deref());
            if let Some(parent) = parent_id.as_deref() {
                if !by_id.contains_key(parent) {
                    errors.push(format!("parentId: task not found: {parent}"));
                }
            }
            let dependencies = normalize_ids(&input.dependencies);
            for dependency in &dependencies {
                if !by_id.contains_key(dependency.as_str()) {
                    errors.push(format!("dependencies: task not found: {dependency}"));
                }
            }
            if !errors.is_empty() {
                return Err(Error::Validation(errors));
            }

            let existing_ids: HashSet<String> =
                existing.iter().map(|task| task.id.clone()).collect();
            let now = Utc::now();
            let task = Task {
                id: self.generate_task_id(&existing_ids),
                title,
                description: clean_description(input.description.as_deref()),
                status: TaskStatus::Todo,
                priority: input.priority.unwrap_or_default(),
                assignee: non_empty(input.assignee.as_deref()),
                labels,
                story_points: input.story_points,
                estimated_hours: input.estimated_hours,
                sprint: non_empty(input.sprint.as_deref()),
                due_date: input.due_date,
                acceptance_criteria: criteria,
                parent_id,
                dependencies,
                draft: input.draft,
                created_at: now,
                updated_at: now,
                completed_at: None,
                archived_at: None,
            };
            self.write_task(&task)?;
            info!(task_id = %task.id, "task created");
            Ok(task)
        })
    }

    /// Look up a task by exact id. Unknown ids are `Ok(None)`.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        self.storage.read_json_opt(&self.storage.task_file(id))
    }

    /// Merge `patch` into the task, refresh `updatedAt` and persist.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        self.storage.locked(|| {
            let Some(mut task) = self.get_task(id)? else {
                return Ok(None);
            };
            let mut errors = Vec::new();
            let previous_assignee = task.assignee.clone();
            self.apply_patch(&mut task, patch, &mut errors)?;
            if task.status == TaskStatus::Focused && task.assignee != previous_assignee {
                if let Some(owner) = task.assignee.as_deref() {
                    let focused = self.tasks_for_assignee(owner, TaskStatus::Focused, &task.id)?;
                    if let Some(other) = focused.first() {
                        errors.push(format!(
                            "assignee: {owner} is already focused on {} ({})",
                            other.id, other.title
                        ));
                    }
                }
            }
            if !errors.is_empty() {
                return Err(Error::Validation(errors));
            }
            task.touch();
            self.write_task(&task)?;
            debug!(task_id = %task.id, "task updated");
            Ok(Some(task))
        })
    }

    /// Hard delete. References from other tasks (dependencies, parent links)
    /// are removed so nothing points at a missing record.
    pub fn delete_task(&self, id: &str) -> Result<bool> {
        self.storage.locked(|| {
            if !is_valid_id(id) || !self.storage.remove_file(&self.storage.task_file(id))? {
                return Ok(false);
            }
            for mut task in self.load_all()? {
                let before = task.dependencies.len();
                task.dependencies.retain(|dependency| dependency != id);
                let detached = task.parent_id.as_deref() == Some(id);
                if detached {
                    task.parent_id = None;
                }
                if detached || task.dependencies.len() != before {
                    task.touch();
                    self.write_task(&task)?;
                }
            }
            info!(task_id = %id, "task deleted");
            Ok(true)
        })
    }

    /// Set `archivedAt` once; archiving an archived task returns it unchanged.
    pub fn archive_task(&self, id: &str) -> Result<Option<Task>> {
        self.storage.locked(|| {
            let Some(mut task) = self.get_task(id)? else {
                return Ok(None);
            };
            if task.archived_at.is_some() {
                return Ok(Some(task));
            }
            let now = task.touch();
            task.archived_at = Some(now);
            self.write_task(&task)?;
            info!(task_id = %task.id, "task archived");
            Ok(Some(task))
        })
    }

    pub fn list_tasks(
        &self,
        filter: &TaskFilter,
        sort: TaskSort,
        page: Pagination,
    ) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .load_all()?
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect();
        tasks.sort_by(|left, right| sort.compare(left, right));
        let limit = page.limit.unwrap_or(usize::MAX);
        Ok(tasks.into_iter().skip(page.offset).take(limit).collect())
    }

    pub fn get_stats(&self) -> Result<TaskStats> {
        Ok(TaskStats::from_tasks(&self.load_all()?))
    }

    /// Other tasks owned by `assignee` currently in `status`.
    pub fn tasks_for_assignee(
        &self,
        assignee: &str,
        status: TaskStatus,
        exclude_id: &str,
    ) -> Result<Vec<Task>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|task| {
                task.id != exclude_id
                    && task.status == status
                    && task.assignee.as_deref() == Some(assignee)
            })
            .collect())
    }

    /// Resolve user input to a task id: exact id, or a unique prefix of the
    /// id or of its suffix after the `<prefix>-` part.
    pub fn resolve_task_id(&self, input: &str) -> Result<String> {
        let trimmed = input.trim().to_ascii_lowercase();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("task id cannot be empty".to_string()));
        }

        let mut matches = Vec::new();
        for id in self.task_ids()? {
            if id == trimmed {
                return Ok(id);
            }
            let suffix = id.split_once('-').map(|(_, suffix)| suffix).unwrap_or(&id);
            if id.starts_with(&trimmed) || suffix.starts_with(&trimmed) {
                matches.push(id);
            }
        }

        matches.sort();
        match matches.len() {
            0 => Err(Error::TaskNotFound(input.trim().to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::InvalidArgument(format!(
                "ambiguous task id '{}': {}",
                input.trim(),
                matches.join(", ")
            ))),
        }
    }

    /// Append an executed transition to the audit log.
    pub fn append_transition(&self, record: &TransitionRecord) -> Result<()> {
        self.storage
            .append_jsonl(&self.storage.audit_file(), record)
    }

    /// Transition history for one task, oldest first.
    pub fn transition_history(&self, task_id: &str) -> Result<Vec<TransitionRecord>> {
        let records: Vec<TransitionRecord> =
            self.storage.read_jsonl(&self.storage.audit_file())?;
        Ok(records
            .into_iter()
            .filter(|record| record.task_id == task_id)
            .collect())
    }

    /// Persist a status change produced by the transition executor. Kept
    /// crate-private so status only moves through validated transitions.
    pub(crate) fn persist_transition(&self, task: &Task) -> Result<()> {
        self.storage.locked(|| self.write_task(task))
    }

    /// Load every task record.
    pub fn load_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for id in self.task_ids()? {
            if let Some(task) = self.get_task(&id)? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    fn task_ids(&self) -> Result<Vec<String>> {
        let dir = self.storage.tasks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if is_valid_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn write_task(&self, task: &Task) -> Result<()> {
        self.storage
            .write_json(&self.storage.task_file(&task.id), task)
    }

    fn generate_task_id(&self, existing: &HashSet<String>) -> String {
        let prefix = self.config.id_prefix.trim().to_ascii_lowercase();
        let mut len = self.config.id_min_len.clamp(1, ULID_RANDOM_LEN);
        let mut attempts = 0;
        loop {
            let ulid = Ulid::new().to_string().to_ascii_lowercase();
            let random: String = ulid.chars().skip(ULID_TIME_LEN).take(len).collect();
            let candidate = format!("{prefix}-{random}");
            if !existing.contains(&candidate) {
                return candidate;
            }
            attempts += 1;
            if attempts % ID_ATTEMPTS_PER_LEN == 0 && len < ULID_RANDOM_LEN {
                len += 1;
            }
        }
    }

    fn check_title(&self, raw: &str, errors: &mut Vec<String>) -> String {
        let cleaned = sanitize_text(raw, false);
        let title = cleaned.trim();
        if title.is_empty() {
            errors.push("title: cannot be empty".to_string());
        } else if title.chars().count() > self.config.max_title_len {
            errors.push(format!(
                "title: longer than {} characters",
                self.config.max_title_len
            ));
        }
        title.to_string()
    }

    fn apply_patch(
        &self,
        task: &mut Task,
        patch: TaskPatch,
        errors: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(title) = patch.title {
            task.title = self.check_title(&title, errors);
        }
        if let Some(description) = patch.description {
            task.description = clean_description(description.as_deref());
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assignee) = patch.assignee {
            task.assignee = non_empty(assignee.as_deref());
        }
        if let Some(labels) = patch.labels {
            task.labels = normalize_labels(&labels, errors);
        }
        task.labels
            .extend(normalize_labels(&patch.add_labels, errors));
        for label in &patch.remove_labels {
            task.labels.remove(label.trim());
        }
        if let Some(points) = patch.story_points {
            check_story_points(points, errors);
            task.story_points = points;
        }
        if let Some(hours) = patch.estimated_hours {
            check_estimated_hours(hours, errors);
            task.estimated_hours = hours;
        }
        if let Some(sprint) = patch.sprint {
            task.sprint = non_empty(sprint.as_deref());
        }
        if let Some(due) = patch.due_date {
            task.due_date = due;
        }
        if let Some(criteria) = patch.acceptance_criteria {
            task.acceptance_criteria = criteria;
        }
        task.acceptance_criteria
            .extend(normalize_criteria(&patch.add_criteria, errors));
        for index in patch.complete_criteria {
            match task.acceptance_criteria.get_mut(index) {
                Some(criterion) => criterion.done = true,
                None => errors.push(format!("acceptanceCriteria: no criterion at index {index}")),
            }
        }
        if let Some(draft) = patch.draft {
            task.draft = draft;
        }

        let touches_graph = patch.parent_id.is_some() || patch.dependencies.is_some();
        if let Some(parent) = patch.parent_id {
            task.parent_id = non_empty(parent.as_deref());
        }
        if let Some(dependencies) = patch.dependencies {
            task.dependencies = normalize_ids(&dependencies);
        }
        if touches_graph {
            let others = self.load_all()?;
            check_relations(task, &others, errors);
        }
        Ok(())
    }
}

/// Validate parent and dependency links of `task` against the rest of the
/// store: referenced ids exist, no self references, no cycles.
fn check_relations(task: &Task, others: &[Task], errors: &mut Vec<String>) {
    let mut graph: HashMap<&str, &Task> = others
        .iter()
        .map(|other| (other.id.as_str(), other))
        .collect();
    graph.insert(task.id.as_str(), task);

    if let Some(parent) = task.parent_id.as_deref() {
        if parent == task.id {
            errors.push("parentId: a task cannot be its own parent".to_string());
        } else if !graph.contains_key(parent) {
            errors.push(format!("parentId: task not found: {parent}"));
        } else {
            let mut seen = HashSet::new();
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == task.id {
                    errors.push(format!("parentId: {parent} is a descendant of {}", task.id));
                    break;
                }
                if !seen.insert(current) {
                    break;
                }
                cursor = graph.get(current).and_then(|t| t.parent_id.as_deref());
            }
        }
    }

    for dependency in &task.dependencies {
        if dependency == &task.id {
            errors.push("dependencies: a task cannot depend on itself".to_string());
        } else if !graph.contains_key(dependency.as_str()) {
            errors.push(format!("dependencies: task not found: {dependency}"));
        }
    }
    if let Some(cycle) = find_dependency_cycle(&task.id, &graph) {
        errors.push(format!("dependencies: cycle detected: {}", cycle.join(" -> ")));
    }
}

/// Depth-first search for a dependency path leading back to `start`.
fn find_dependency_cycle(start: &str, graph: &HashMap<&str, &Task>) -> Option<Vec<String>> {
    let mut stack: Vec<(String, Vec<String>)> = vec![(start.to_string(), vec![start.to_string()])];
    let mut visited = HashSet::new();
    while let Some((current, path)) = stack.pop() {
        let Some(task) = graph.get(current.as_str()) else {
            continue;
        };
        for dependency in &task.dependencies {
            if dependency == start {
                let mut cycle = path.clone();
                cycle.push(start.to_string());
                return Some(cycle);
            }
            if visited.insert(dependency.clone()) {
                let mut next = path.clone();
                next.push(dependency.clone());
                stack.push((dependency.clone(), next));
            }
        }
    }
    None
}

fn check_story_points(points: Option<u32>, errors: &mut Vec<String>) {
    if points == Some(0) {
        errors.push("storyPoints: must be a positive integer".to_string());
    }
}

fn check_estimated_hours(hours: Option<f64>, errors: &mut Vec<String>) {
    if let Some(hours) = hours {
        if !hours.is_finite() || hours < 0.0 {
            errors.push("estimatedHours: must be a non-negative number".to_string());
        }
    }
}

fn normalize_labels(labels: &[String], errors: &mut Vec<String>) -> BTreeSet<String> {
    let mut normalized = BTreeSet::new();
    for label in labels {
        let label = sanitize_text(label, false);
        let label = label.trim();
        if label.is_empty() {
            errors.push("labels: label cannot be empty".to_string());
        } else {
            normalized.insert(label.to_string());
        }
    }
    normalized
}

fn normalize_criteria(criteria: &[String], errors: &mut Vec<String>) -> Vec<AcceptanceCriterion> {
    let mut normalized = Vec::new();
    for criterion in criteria {
        let criterion = sanitize_text(criterion, false);
        let criterion = criterion.trim();
        if criterion.is_empty() {
            errors.push("acceptanceCriteria: criterion cannot be empty".to_string());
        } else {
            normalized.push(AcceptanceCriterion::new(criterion));
        }
    }
    normalized
}

fn normalize_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn clean_description(value: Option<&str>) -> Option<String> {
    non_empty(value.map(|text| sanitize_text(text, true)).as_deref())
}

/// Strip terminal escape sequences, control characters and invisible
/// formatting characters from user text. Newlines and tabs are kept in
/// multi-line text and become spaces elsewhere.
fn sanitize_text(raw: &str, multiline: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\u{1b}' => skip_escape_sequence(&mut chars),
            '\n' | '\t' => out.push(if multiline { ch } else { ' ' }),
            ch if ch.is_control() || is_invisible_format(ch) => {}
            ch => out.push(ch),
        }
    }
    out
}

/// Consume the rest of an escape sequence whose ESC was already read.
fn skip_escape_sequence(chars: &mut Peekable<Chars<'_>>) {
    match chars.next() {
        // CSI: parameters up to a final byte in `@..=~`.
        Some('[') => {
            for ch in chars.by_ref() {
                if ('@'..='~').contains(&ch) {
                    break;
                }
            }
        }
        // OSC: terminated by BEL or ESC `\`.
        Some(']') => {
            while let Some(ch) = chars.next() {
                if ch == '\u{7}' {
                    break;
                }
                if ch == '\u{1b}' {
                    chars.next_if_eq(&'\\');
                    break;
                }
            }
        }
        Some('(' | ')') => {
            chars.next();
        }
        _ => {}
    }
}

fn is_invisible_format(ch: char) -> bool {
    matches!(
        ch,
        '\u{200b}'..='\u{200f}' | '\u{202a}'..='\u{202e}' | '\u{2066}'..='\u{2069}' | '\u{feff}'
    )
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
