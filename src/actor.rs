//! Actor identity management.
//!
//! Actor resolution order:
//! 1) CLI --actor (explicit)
//! 2) CRIT_ACTOR environment variable
//! 3) Persisted value in .crit/actor
//! 4) Config default (actor.default)

use crate::config::ActorConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;

pub const ACTOR_ENV: &str = "CRIT_ACTOR";

/// Where the resolved actor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorSource {
    Cli,
    Env,
    Persisted,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedActor {
    pub name: String,
    pub source: ActorSource,
}

/// Resolve the current actor using CLI, environment, persisted value, and config.
pub fn resolve_actor(
    storage: &Storage,
    config: &ActorConfig,
    cli_actor: Option<&str>,
) -> Result<ResolvedActor> {
    let env_actor = std::env::var(ACTOR_ENV).ok();
    resolve_with_env(storage, config, cli_actor, env_actor.as_deref())
}

fn resolve_with_env(
    storage: &Storage,
    config: &ActorConfig,
    cli_actor: Option<&str>,
    env_actor: Option<&str>,
) -> Result<ResolvedActor> {
    if let Some(actor) = non_empty(cli_actor) {
        return Ok(resolved(actor, ActorSource::Cli));
    }
    if let Some(actor) = non_empty(env_actor) {
        return Ok(resolved(actor, ActorSource::Env));
    }
    if let Some(actor) = storage.read_actor()? {
        return Ok(resolved(&actor, ActorSource::Persisted));
    }
    Ok(resolved(&config.default, ActorSource::Config))
}

/// Persist the actor identity in `.crit/actor`.
pub fn persist_actor(storage: &Storage, actor: &str) -> Result<String> {
    let actor = non_empty(Some(actor))
        .ok_or_else(|| Error::InvalidArgument("actor name cannot be empty".to_string()))?;
    if actor.chars().any(char::is_whitespace) {
        return Err(Error::InvalidArgument(format!(
            "actor name cannot contain whitespace: '{actor}'"
        )));
    }
    storage.write_actor(actor)?;
    Ok(actor.to_string())
}

fn resolved(name: &str, source: ActorSource) -> ResolvedActor {
    ResolvedActor {
        name: name.to_string(),
        source,
    }
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolution_order() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let config = ActorConfig {
            default: "fallback".to_string(),
        };

        let actor = resolve_with_env(&storage, &config, None, None).unwrap();
        assert_eq!(actor, resolved("fallback", ActorSource::Config));

        persist_actor(&storage, "  persisted ").unwrap();
        let actor = resolve_with_env(&storage, &config, None, None).unwrap();
        assert_eq!(actor, resolved("persisted", ActorSource::Persisted));

        let actor = resolve_with_env(&storage, &config, None, Some("env-user")).unwrap();
        assert_eq!(actor.source, ActorSource::Env);

        let actor = resolve_with_env(&storage, &config, Some("cli-user"), Some("env-user")).unwrap();
        assert_eq!(actor, resolved("cli-user", ActorSource::Cli));

        let actor = resolve_with_env(&storage, &config, Some("   "), Some("")).unwrap();
        assert_eq!(actor.source, ActorSource::Persisted);
    }

    #[test]
    fn persist_rejects_blank_and_spaced_names() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        assert!(matches!(
            persist_actor(&storage, " "),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            persist_actor(&storage, "two words"),
            Err(Error::InvalidArgument(_))
        ));
    }
}
