//! crit actor command implementation
//!
//! Provides actor identity helpers (set/show).

use std::path::PathBuf;

use crate::actor::{self, ActorSource};
use crate::cli::{GlobalOptions, Session};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

#[derive(serde::Serialize)]
struct ActorSetReport {
    actor: String,
    path: PathBuf,
}

#[derive(serde::Serialize)]
struct ActorShowReport {
    actor: String,
    source: ActorSource,
}

pub fn run_set(global: &GlobalOptions, name: &str) -> Result<()> {
    let session = Session::open(global)?;
    let actor_name = actor::persist_actor(&session.storage, name)?;
    let actor_path = session.storage.actor_file();

    let report = ActorSetReport {
        actor: actor_name.clone(),
        path: actor_path.clone(),
    };

    let mut human = HumanOutput::new(format!("crit actor set: {actor_name}"));
    human.push_summary("actor", actor_name);
    human.push_summary("path", super::display_path(&actor_path));
    if !matches!(session.actor.source, ActorSource::Persisted | ActorSource::Config) {
        human.push_warning(format!(
            "--actor/{} still overrides the persisted value",
            actor::ACTOR_ENV
        ));
    }

    emit_success(session.output, "actor set", &report, Some(&human))
}

pub fn run_show(global: &GlobalOptions) -> Result<()> {
    let session = Session::open(global)?;
    let resolved = session.actor.clone();

    let report = ActorShowReport {
        actor: resolved.name.clone(),
        source: resolved.source,
    };

    let mut human = HumanOutput::new(format!("crit actor: {}", resolved.name));
    human.push_summary("actor", resolved.name);
    human.push_summary(
        "source",
        match resolved.source {
            ActorSource::Cli => "--actor",
            ActorSource::Env => actor::ACTOR_ENV,
            ActorSource::Persisted => ".crit/actor",
            ActorSource::Config => "config default",
        },
    );
    if resolved.source == ActorSource::Config {
        human.push_warning("actor not set; using default".to_string());
        human.push_next_step("crit actor set <name>");
    }

    emit_success(session.output, "actor show", &report, Some(&human))
}
