//! crit task command implementations.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::cli::{GlobalOptions, Session, TaskCommands};
use crate::context::ContextCache;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::executor::{ContextActionRunner, TransitionExecutor};
use crate::import::import_tasks;
use crate::output::{emit_success, HumanOutput};
use crate::store::TaskStore;
use crate::task::{
    NewTask, Pagination, Priority, SortDirection, Task, TaskFilter, TaskPatch, TaskSort,
    TaskStatus,
};
use crate::transition::{TransitionMetadata, TransitionRecord, TransitionValidator};

pub struct NewOptions {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub points: Option<u32>,
    pub hours: Option<f64>,
    pub sprint: Option<String>,
    pub due: Option<String>,
    pub criteria: Vec<String>,
    pub parent: Option<String>,
    pub depends_on: Vec<String>,
    pub draft: bool,
}

pub struct ListOptions {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub sprint: Option<String>,
    pub parent: Option<String>,
    pub search: Option<String>,
    pub all: bool,
    pub drafts: bool,
    pub sort: String,
    pub desc: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub clear_description: bool,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub unassign: bool,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub points: Option<u32>,
    pub clear_points: bool,
    pub hours: Option<f64>,
    pub sprint: Option<String>,
    pub clear_sprint: bool,
    pub due: Option<String>,
    pub clear_due: bool,
    pub add_criteria: Vec<String>,
    pub complete_criteria: Vec<usize>,
    pub parent: Option<String>,
    pub clear_parent: bool,
    pub depends_on: Vec<String>,
    pub clear_dependencies: bool,
    pub draft: bool,
    pub ready: bool,
}

pub struct StateOptions {
    pub id: String,
    pub status: String,
    pub reason: Option<String>,
    pub auto_unfocus: bool,
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct TaskIdOutput {
    id: String,
}

#[derive(Serialize)]
struct TaskHistoryOutput {
    task_id: String,
    transitions: Vec<TransitionRecord>,
}

pub fn run(cmd: TaskCommands, global: &GlobalOptions) -> Result<()> {
    match cmd {
        TaskCommands::New {
            title,
            description,
            priority,
            assignee,
            labels,
            points,
            hours,
            sprint,
            due,
            criteria,
            parent,
            depends_on,
            draft,
        } => run_new(
            global,
            NewOptions {
                title,
                description,
                priority,
                assignee,
                labels,
                points,
                hours,
                sprint,
                due,
                criteria,
                parent,
                depends_on,
                draft,
            },
        ),
        TaskCommands::List {
            status,
            priority,
            assignee,
            labels,
            sprint,
            parent,
            search,
            all,
            drafts,
            sort,
            desc,
            offset,
            limit,
        } => run_list(
            global,
            ListOptions {
                status,
                priority,
                assignee,
                labels,
                sprint,
                parent,
                search,
                all,
                drafts,
                sort,
                desc,
                offset,
                limit,
            },
        ),
        TaskCommands::Show { id } => run_show(global, &id),
        TaskCommands::Edit {
            id,
            title,
            description,
            clear_description,
            priority,
            assignee,
            unassign,
            add_labels,
            remove_labels,
            points,
            clear_points,
            hours,
            sprint,
            clear_sprint,
            due,
            clear_due,
            add_criteria,
            complete_criteria,
            parent,
            clear_parent,
            depends_on,
            clear_dependencies,
            draft,
            ready,
        } => run_edit(
            global,
            EditOptions {
                id,
                title,
                description,
                clear_description,
                priority,
                assignee,
                unassign,
                add_labels,
                remove_labels,
                points,
                clear_points,
                hours,
                sprint,
                clear_sprint,
                due,
                clear_due,
                add_criteria,
                complete_criteria,
                parent,
                clear_parent,
                depends_on,
                clear_dependencies,
                draft,
                ready,
            },
        ),
        TaskCommands::Delete { id } => run_delete(global, &id),
        TaskCommands::Archive { id } => run_archive(global, &id),
        TaskCommands::State {
            id,
            status,
            reason,
            auto_unfocus,
        } => run_state(
            global,
            StateOptions {
                id,
                status,
                reason,
                auto_unfocus,
            },
        ),
        TaskCommands::History { id } => run_history(global, &id),
        TaskCommands::Stats => run_stats(global),
        TaskCommands::Import { files } => run_import(global, files),
    }
}

pub fn run_new(global: &GlobalOptions, options: NewOptions) -> Result<()> {
    let mut session = Session::open(global)?;
    let mut cache = session.context_cache()?;

    let mut input = NewTask {
        title: options.title,
        description: options.description,
        status: None,
        priority: options.priority.as_deref().map(str::parse).transpose()?,
        assignee: options.assignee,
        labels: options.labels,
        story_points: options.points,
        estimated_hours: options.hours,
        sprint: options.sprint,
        due_date: options.due.as_deref().map(parse_due).transpose()?,
        acceptance_criteria: options.criteria,
        parent_id: options
            .parent
            .as_deref()
            .map(|id| resolve_or_raw(&session.store, id))
            .transpose()?,
        dependencies: options
            .depends_on
            .iter()
            .map(|id| resolve_or_raw(&session.store, id))
            .collect::<Result<_>>()?,
        draft: options.draft,
    };
    cache.apply_defaults(&mut input)?;
    let task = session.store.create_task(input)?;

    let mut human = HumanOutput::new("Task created");
    push_task_summary(&mut human, &task);
    if let Some(warning) = remember_labels(&mut cache, task.labels.iter()) {
        human.push_warning(warning);
    }
    if let Some(warning) = session.emit_event(EventKind::TaskCreated, &task) {
        human.push_warning(warning);
    }
    human.push_next_step(format!("crit task state {} in_progress", task.id));

    emit_success(session.output, "task new", &task, Some(&human))
}

pub fn run_list(global: &GlobalOptions, options: ListOptions) -> Result<()> {
    let session = Session::open(global)?;
    let filter = TaskFilter {
        status: options.status.as_deref().map(str::parse).transpose()?,
        priority: options
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?,
        assignee: options.assignee,
        labels: options.labels,
        sprint: options.sprint,
        parent_id: options
            .parent
            .as_deref()
            .map(|id| session.store.resolve_task_id(id))
            .transpose()?,
        query: options.search,
        include_archived: options.all,
        include_drafts: options.drafts,
    };
    let sort = TaskSort {
        field: options.sort.parse()?,
        direction: if options.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        },
    };
    let tasks = session.store.list_tasks(
        &filter,
        sort,
        Pagination {
            offset: options.offset,
            limit: options.limit,
        },
    )?;

    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Total", tasks.len().to_string());
    for task in &tasks {
        human.push_detail(task_line(task));
    }
    if tasks.is_empty() {
        human.push_next_step("crit task new \"<title>\"");
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_success(session.output, "task list", &output, Some(&human))
}

pub fn run_show(global: &GlobalOptions, id: &str) -> Result<()> {
    let session = Session::open(global)?;
    let task = load_task(&session.store, id)?;

    let mut human = HumanOutput::new(format!("{}: {}", task.id, task.title));
    push_task_summary(&mut human, &task);
    if let Some(description) = task.description.as_deref() {
        human.push_detail(description.to_string());
    }
    for (index, criterion) in task.acceptance_criteria.iter().enumerate() {
        let mark = if criterion.done { "x" } else { " " };
        human.push_detail(format!("[{mark}] {}. {}", index + 1, criterion.description));
    }

    emit_success(session.output, "task show", &task, Some(&human))
}

pub fn run_edit(global: &GlobalOptions, options: EditOptions) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = session.store.resolve_task_id(&options.id)?;

    let complete_criteria = options
        .complete_criteria
        .iter()
        .map(|n| {
            n.checked_sub(1).ok_or_else(|| {
                Error::InvalidArgument("criterion numbers start at 1".to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let dependencies = if options.clear_dependencies {
        Some(Vec::new())
    } else if options.depends_on.is_empty() {
        None
    } else {
        Some(
            options
                .depends_on
                .iter()
                .map(|dep| resolve_or_raw(&session.store, dep))
                .collect::<Result<Vec<_>>>()?,
        )
    };
    let parent_id = match (options.clear_parent, options.parent.as_deref()) {
        (true, _) => Some(None),
        (false, Some(parent)) => Some(Some(resolve_or_raw(&session.store, parent)?)),
        (false, None) => None,
    };

    let added_labels = options.add_labels.clone();
    let patch = TaskPatch {
        title: options.title,
        description: clearable(options.description, options.clear_description),
        priority: options.priority.as_deref().map(str::parse).transpose()?,
        assignee: clearable(options.assignee, options.unassign),
        labels: None,
        add_labels: options.add_labels,
        remove_labels: options.remove_labels,
        story_points: clearable(options.points, options.clear_points),
        estimated_hours: options.hours.map(Some),
        sprint: clearable(options.sprint, options.clear_sprint),
        due_date: clearable(
            options.due.as_deref().map(parse_due).transpose()?,
            options.clear_due,
        ),
        acceptance_criteria: None,
        add_criteria: options.add_criteria,
        complete_criteria,
        parent_id,
        dependencies,
        draft: if options.draft {
            Some(true)
        } else if options.ready {
            Some(false)
        } else {
            None
        },
    };
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to edit; pass at least one field flag".to_string(),
        ));
    }

    let task = session
        .store
        .update_task(&id, patch)?
        .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

    let mut human = HumanOutput::new("Task updated");
    push_task_summary(&mut human, &task);
    if !added_labels.is_empty() {
        let mut cache = session.context_cache()?;
        if let Some(warning) = remember_labels(&mut cache, added_labels.iter()) {
            human.push_warning(warning);
        }
    }
    if let Some(warning) = session.emit_event(EventKind::TaskUpdated, &task) {
        human.push_warning(warning);
    }

    emit_success(session.output, "task edit", &task, Some(&human))
}

pub fn run_delete(global: &GlobalOptions, id: &str) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = session.store.resolve_task_id(id)?;
    if !session.store.delete_task(&id)? {
        return Err(Error::TaskNotFound(id));
    }

    let mut human = HumanOutput::new("Task deleted");
    human.push_summary("ID", id.clone());
    if let Some(warning) = forget_task(&session, &id) {
        human.push_warning(warning);
    }
    let output = TaskIdOutput { id };
    if let Some(warning) = session.emit_event(EventKind::TaskDeleted, &output) {
        human.push_warning(warning);
    }

    emit_success(session.output, "task delete", &output, Some(&human))
}

pub fn run_archive(global: &GlobalOptions, id: &str) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = session.store.resolve_task_id(id)?;
    let task = session
        .store
        .archive_task(&id)?
        .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

    let mut human = HumanOutput::new("Task archived");
    push_task_summary(&mut human, &task);
    if let Some(warning) = forget_task(&session, &task.id) {
        human.push_warning(warning);
    }
    if let Some(warning) = session.emit_event(EventKind::TaskArchived, &task) {
        human.push_warning(warning);
    }

    emit_success(session.output, "task archive", &task, Some(&human))
}

pub fn run_state(global: &GlobalOptions, options: StateOptions) -> Result<()> {
    let mut session = Session::open(global)?;
    let target: TaskStatus = options.status.parse()?;
    let id = session.store.resolve_task_id(&options.id)?;
    let validator = TransitionValidator::from_config(&session.config.tasks)?;
    let runner = ContextActionRunner::new(session.context_cache()?);

    let outcome = {
        let mut executor = TransitionExecutor::new(&session.store, validator, runner);
        executor.change_task_state(
            &id,
            target,
            &session.actor.name,
            options.reason.as_deref(),
            TransitionMetadata {
                auto_unfocus: options.auto_unfocus,
            },
        )?
    };
    if !outcome.success {
        return Err(Error::TransitionRejected {
            task_id: id,
            errors: outcome.validation.errors,
        });
    }

    let mut human = HumanOutput::new(format!("Task {}: {}", outcome.task.id, target));
    push_task_summary(&mut human, &outcome.task);
    for warning in &outcome.validation.warnings {
        human.push_warning(warning.clone());
    }
    for action in &outcome.required_actions {
        human.push_detail(action.describe());
    }
    for failure in &outcome.action_failures {
        human.push_warning(format!(
            "action failed: {}: {}",
            failure.action.describe(),
            failure.error
        ));
    }
    if let Some(record) = outcome.record.as_ref() {
        if let Err(err) = session.store.append_transition(record) {
            human.push_warning(format!("audit log write failed: {err}"));
        }
        if let Some(warning) = session.emit_event(EventKind::TaskStateChanged, record) {
            human.push_warning(warning);
        }
    }

    emit_success(session.output, "task state", &outcome, Some(&human))
}

pub fn run_history(global: &GlobalOptions, id: &str) -> Result<()> {
    let session = Session::open(global)?;
    let task_id = session.store.resolve_task_id(id)?;
    let transitions = session.store.transition_history(&task_id)?;

    let mut human = HumanOutput::new(format!("History of {task_id}"));
    human.push_summary("Transitions", transitions.len().to_string());
    for record in &transitions {
        let mut line = format!(
            "{} {} → {} by {}",
            record.timestamp.to_rfc3339(),
            record.from_status,
            record.to_status,
            record.actor
        );
        if let Some(reason) = record.reason.as_deref() {
            line.push_str(&format!(" ({reason})"));
        }
        human.push_detail(line);
    }

    let output = TaskHistoryOutput {
        task_id,
        transitions,
    };
    emit_success(session.output, "task history", &output, Some(&human))
}

pub fn run_stats(global: &GlobalOptions) -> Result<()> {
    let session = Session::open(global)?;
    let stats = session.store.get_stats()?;

    let mut human = HumanOutput::new("Task stats");
    human.push_summary("Total", stats.total.to_string());
    human.push_summary("Active", stats.active.to_string());
    human.push_summary("Archived", stats.archived.to_string());
    human.push_summary("Drafts", stats.drafts.to_string());
    human.push_summary(
        "By status",
        stats
            .by_status
            .iter()
            .map(|entry| format!("{}={}", entry.status, entry.count))
            .collect::<Vec<_>>()
            .join(", "),
    );
    human.push_summary(
        "By priority",
        stats
            .by_priority
            .iter()
            .map(|entry| format!("{}={}", entry.priority, entry.count))
            .collect::<Vec<_>>()
            .join(", "),
    );

    emit_success(session.output, "task stats", &stats, Some(&human))
}

pub fn run_import(global: &GlobalOptions, files: Vec<PathBuf>) -> Result<()> {
    let mut session = Session::open(global)?;
    let mut cache = session.context_cache()?;
    let report = import_tasks(&session.store, &files, &session.config.import, |input| {
        cache.apply_defaults(input)
    })?;

    if report.created.is_empty() && !report.is_clean() {
        return Err(Error::Validation(
            report
                .failures
                .iter()
                .map(|failure| format!("{}: {}", failure.source, failure.error))
                .collect(),
        ));
    }

    let mut human = HumanOutput::new(format!("Imported {} tasks", report.created.len()));
    human.push_summary("Created", report.created.len().to_string());
    human.push_summary("Failed", report.failures.len().to_string());
    for task in &report.created {
        human.push_detail(task_line(task));
    }
    for failure in &report.failures {
        human.push_warning(format!("{}: {}", failure.source, failure.error));
    }
    if let Some(warning) =
        remember_labels(&mut cache, report.created.iter().flat_map(|task| task.labels.iter()))
    {
        human.push_warning(warning);
    }
    for task in &report.created {
        if let Some(warning) = session.emit_event(EventKind::TaskImported, task) {
            human.push_warning(warning);
            break;
        }
    }

    emit_success(session.output, "task import", &report, Some(&human))
}

fn load_task(store: &TaskStore, input: &str) -> Result<Task> {
    let id = store.resolve_task_id(input)?;
    store.get_task(&id)?.ok_or(Error::TaskNotFound(id))
}

/// Resolve a prefix to a full id; unknown ids pass through so the store can
/// report them alongside other validation errors.
fn resolve_or_raw(store: &TaskStore, input: &str) -> Result<String> {
    match store.resolve_task_id(input) {
        Ok(id) => Ok(id),
        Err(Error::TaskNotFound(_)) => Ok(input.trim().to_string()),
        Err(err) => Err(err),
    }
}

fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

/// RFC 3339 timestamp, or a plain date meaning the end of that day (UTC).
fn parse_due(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid due date '{value}' (expected YYYY-MM-DD or RFC 3339)"
            ))
        })
}

fn remember_labels<'a>(
    cache: &mut ContextCache,
    labels: impl Iterator<Item = &'a String>,
) -> Option<String> {
    for label in labels {
        if let Err(err) = cache.add_recent_label(label) {
            return Some(format!("context update failed: {err}"));
        }
    }
    None
}

/// Drop a removed or archived task from the context cache.
fn forget_task(session: &Session, task_id: &str) -> Option<String> {
    let result = session.context_cache().and_then(|mut cache| {
        cache.unfocus_task(task_id)?;
        cache.clear_blocker_review(task_id)
    });
    result.err().map(|err| format!("context update failed: {err}"))
}

fn task_line(task: &Task) -> String {
    let mut line = format!("[{}][{}] {} {}", task.status, task.priority, task.id, task.title);
    if let Some(assignee) = task.assignee.as_deref() {
        line.push_str(&format!(" @{assignee}"));
    }
    if let Some(sprint) = task.sprint.as_deref() {
        line.push_str(&format!(" (sprint: {sprint})"));
    }
    if task.is_archived() {
        line.push_str(" (archived)");
    }
    line
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("ID", task.id.clone());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Status", task.status.to_string());
    human.push_summary("Priority", task.priority.to_string());
    if let Some(assignee) = task.assignee.as_deref() {
        human.push_summary("Assignee", assignee);
    }
    if !task.labels.is_empty() {
        human.push_summary(
            "Labels",
            task.labels.iter().cloned().collect::<Vec<_>>().join(", "),
        );
    }
    if let Some(points) = task.story_points {
        human.push_summary("Points", points.to_string());
    }
    if let Some(hours) = task.estimated_hours {
        human.push_summary("Estimate", format!("{hours}h"));
    }
    if let Some(sprint) = task.sprint.as_deref() {
        human.push_summary("Sprint", sprint);
    }
    if let Some(due) = task.due_date {
        human.push_summary("Due", due.to_rfc3339());
    }
    if let Some(parent) = task.parent_id.as_deref() {
        human.push_summary("Parent", parent);
    }
    if !task.dependencies.is_empty() {
        human.push_summary("Depends on", task.dependencies.join(", "));
    }
    if task.draft {
        human.push_summary("Draft", "");
    }
    if let Some(archived_at) = task.archived_at {
        human.push_summary("Archived", archived_at.to_rfc3339());
    }
}
