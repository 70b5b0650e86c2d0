//! crit context command implementations.

use chrono::Utc;

use crate::cli::{ContextCommands, GlobalOptions, Session};
use crate::context::{Context, ContextField, ContextPatch};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};

pub fn run(cmd: ContextCommands, global: &GlobalOptions) -> Result<()> {
    let session = Session::open(global)?;
    let mut cache = session.context_cache()?;

    let (command, header, context) = match cmd {
        ContextCommands::Show => ("context show", "Context".to_string(), cache.current_context()?),
        ContextCommands::Sprint { name, clear } => {
            let sprint = match (name, clear) {
                (_, true) => None,
                (Some(name), false) => Some(name),
                (None, false) => {
                    return Err(Error::InvalidArgument(
                        "pass a sprint name or --clear".to_string(),
                    ))
                }
            };
            let header = match sprint.as_deref() {
                Some(name) => format!("Active sprint set to {name}"),
                None => "Active sprint cleared".to_string(),
            };
            let context = cache.update_context(ContextPatch {
                active_sprint: Some(sprint),
                ..ContextPatch::default()
            })?;
            ("context sprint", header, context)
        }
        ContextCommands::Label { label } => {
            cache.add_recent_label(&label)?;
            (
                "context label",
                format!("Recorded label {}", label.trim()),
                cache.current_context()?,
            )
        }
        ContextCommands::Focus { id } => {
            let id = session.store.resolve_task_id(&id)?;
            cache.focus_task(&id)?;
            ("context focus", format!("Focused {id}"), cache.current_context()?)
        }
        ContextCommands::Unfocus { id } => {
            let id = session.store.resolve_task_id(&id)?;
            cache.unfocus_task(&id)?;
            ("context unfocus", format!("Unfocused {id}"), cache.current_context()?)
        }
        ContextCommands::Invalidate { field } => {
            let field: ContextField = field.parse()?;
            cache.invalidate_cache(field)?;
            (
                "context invalidate",
                format!("Invalidated {field}"),
                cache.current_context()?,
            )
        }
    };

    let human = context_output(header, &context);
    emit_success(session.output, command, &context, Some(&human))
}

fn context_output(header: String, context: &Context) -> HumanOutput {
    let mut human = HumanOutput::new(header);
    human.push_summary(
        "Active sprint",
        context.active_sprint.as_deref().unwrap_or("(none)"),
    );
    human.push_summary("Recent labels", join_or_none(&context.recent_labels));
    human.push_summary("Focused tasks", join_or_none(&context.focused_tasks));

    let now = Utc::now();
    for review in &context.blocker_reviews {
        human.push_detail(format!(
            "review {} at {}: {}",
            review.task_id,
            review.review_at.to_rfc3339(),
            review.reason
        ));
    }
    for review in context.due_reviews(now) {
        human.push_warning(format!("blocker review due for {}", review.task_id));
    }
    human
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
