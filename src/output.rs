//! Shared output formatting for crit CLI commands.

use serde::Serialize;

use crate::error::{exit_codes, Error, JsonError, Result};

pub const SCHEMA_VERSION: &str = "crit.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let warnings = human.map(|h| h.warnings.clone()).unwrap_or_default();
        let next_steps = human.map(|h| h.next_steps.clone()).unwrap_or_default();

        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            data: &'a T,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            warnings: Vec<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings,
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        #[derive(Serialize)]
        struct ErrorBody {
            #[serde(flatten)]
            error: JsonError,
            kind: &'static str,
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            error: ErrorBody,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: ErrorBody {
                error: JsonError::from(err),
                kind: error_kind(err),
            },
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(errors) = listed_errors(err) {
        for error in errors {
            eprintln!("  - {error}");
        }
    }
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

/// Render for a terminal: the header, an aligned key/value block, indented
/// details, then warnings and suggested next commands.
pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    let width = output
        .summary
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0);
    for (key, value) in &output.summary {
        let line = if value.is_empty() {
            format!("  {key}")
        } else {
            format!("  {key:<width$}  {value}")
        };
        lines.push(line);
    }

    if !output.details.is_empty() {
        lines.push(String::new());
        lines.extend(output.details.iter().map(|detail| format!("  {detail}")));
    }
    if !output.warnings.is_empty() || !output.next_steps.is_empty() {
        lines.push(String::new());
    }
    lines.extend(output.warnings.iter().map(|warning| format!("warning: {warning}")));
    lines.extend(output.next_steps.iter().map(|step| format!("next: {step}")));

    lines.join("\n")
}

pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

/// Global flags that consume the following argument.
const VALUE_FLAGS: [&str; 3] = ["--root", "--actor", "--events"];

fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut positional = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            args.next();
        } else if !arg.starts_with('-') {
            positional.push(arg);
        }
    }
    let mut args = positional.into_iter();

    let command = match args.next() {
        Some(cmd) => cmd,
        None => return "crit".to_string(),
    };

    if matches!(command.as_str(), "task" | "context" | "actor") {
        if let Some(sub) = args.next() {
            return format!("{command} {sub}");
        }
    }
    command
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::TransitionRejected { .. } => "transition_rejected",
        Error::Validation(_) => "validation_error",
        Error::TaskNotFound(_) => "not_found",
        _ if err.exit_code() == exit_codes::USER_ERROR => "user_error",
        _ => "operation_failed",
    }
}

/// Multi-error failures are listed one per line in human output.
fn listed_errors(err: &Error) -> Option<&[String]> {
    match err {
        Error::Validation(errors) | Error::TransitionRejected { errors, .. }
            if errors.len() > 1 =>
        {
            Some(errors)
        }
        _ => None,
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::TaskNotFound(_) => vec!["crit task list --all".to_string()],
        Error::TransitionRejected { task_id, .. } => vec![format!("crit task show {task_id}")],
        Error::NotInitialized(_) => vec!["crit init".to_string()],
        Error::InvalidConfig(_) => vec!["fix .crit.toml then retry".to_string()],
        Error::LockFailed(_) => vec!["retry once the other crit process finishes".to_string()],
        _ => Vec::new(),
    }
}
