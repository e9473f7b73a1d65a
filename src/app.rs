//! Top-level flow of one invocation, once the config file is loaded.
//!
//! Fatal problems (no logs, unknown aliases, unparseable bounds) are all
//! detected in [`plan`] before any stream is opened, so a partially
//! invalid request never runs.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::backend::QueryBackend;
use crate::cli::Cli;
use crate::config::{Accounts, AppConfig, ConfigError, SETUP_HINT};
use crate::format::{compile, resolve_template, Palette, Renderer, TemplateOptions};
use crate::planner::{
    build_query, select_logs, write_listing, Query, QueryError, Selection, UnknownAliasError,
};
use crate::registry::AliasRegistry;
use crate::stream::Dispatcher;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that end the run before any query is sent.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    UnknownAlias(UnknownAliasError),
    Query(QueryError),
    Io(io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{}", e),
            AppError::UnknownAlias(e) => write!(f, "{}", e),
            AppError::Query(e) => write!(f, "{}", e),
            AppError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::UnknownAlias(e) => Some(e),
            AppError::Query(e) => Some(e),
            AppError::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<UnknownAliasError> for AppError {
    fn from(err: UnknownAliasError) -> Self {
        AppError::UnknownAlias(err)
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Query(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Io(err)
    }
}

/// Print a fatal error to `err`. Config errors get setup guidance.
pub fn report_error<E: Write>(err: &mut E, error: &AppError) {
    let _ = match error {
        AppError::Config(e) => writeln!(err, "\nle-query: {}\n\n{}\n", e, SETUP_HINT),
        other => writeln!(err, "le-query: {}", other),
    };
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Build the alias registry, printing collision warnings to `err`.
///
/// Fails when no enabled log is configured.
pub fn build_registry<E: Write>(
    accounts: &Accounts,
    config_path: &Path,
    err: &mut E,
) -> Result<AliasRegistry, AppError> {
    let (registry, warnings) = AliasRegistry::build(accounts);
    for warning in &warnings {
        let _ = writeln!(err, "le-query: warning: {}", warning);
    }
    if registry.is_empty() {
        return Err(ConfigError::NoLogs(config_path.to_path_buf()).into());
    }
    Ok(registry)
}

/// What the invocation will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Print the known aliases and exit successfully.
    Listing,
    /// Run `query` against `aliases`, printing records with `renderer`.
    Query {
        aliases: Vec<String>,
        query: Query,
        renderer: Renderer,
    },
}

/// Decide what to do from the command line, the effective config and the
/// registry, relative to `now`.
pub fn plan(
    cli: &Cli,
    config: &AppConfig,
    registry: &AliasRegistry,
    palette: &Palette,
    now: DateTime<Utc>,
) -> Result<Plan, AppError> {
    let aliases = match select_logs(registry, &cli.log)? {
        Selection::Listing => return Ok(Plan::Listing),
        Selection::Logs(aliases) => aliases,
    };

    let template = resolve_template(&TemplateOptions {
        format: config.display.format.clone(),
        show_time: config.display.show_time,
        log_name: cli.log_name(),
        log_count: aliases.len(),
    });
    tracing::debug!(template = %template, logs = aliases.len(), "display template");
    let renderer = compile(&template, palette, config.display.utc);

    let query = build_query(&cli.query_args(config.display.utc), now)?;

    Ok(Plan::Query {
        aliases,
        query,
        renderer,
    })
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Everything `run` needs besides the command line and output sinks.
pub struct Context<'a, B> {
    pub config: &'a AppConfig,
    pub config_path: &'a Path,
    pub accounts: &'a Accounts,
    pub backend: &'a B,
    pub palette: &'a Palette,
    pub now: DateTime<Utc>,
}

/// Run one invocation and return the process exit status.
///
/// 0 for a clean run or a listing; 1 for any fatal error or when at least
/// one stream reported an error.
pub async fn run<B, O, E>(cli: &Cli, ctx: Context<'_, B>, out: &mut O, err: &mut E) -> i32
where
    B: QueryBackend,
    O: Write,
    E: Write,
{
    let prepared = build_registry(ctx.accounts, ctx.config_path, err).and_then(|registry| {
        let plan = plan(cli, ctx.config, &registry, ctx.palette, ctx.now)?;
        Ok((registry, plan))
    });

    let (registry, plan) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            report_error(err, &e);
            return 1;
        }
    };

    match plan {
        Plan::Listing => {
            // A closed stdout during the listing is not worth failing over.
            let _ = write_listing(out, &registry, ctx.palette);
            0
        }
        Plan::Query {
            aliases,
            query,
            renderer,
        } => {
            let dispatcher = Dispatcher::new(&registry, &renderer, ctx.palette, ctx.backend);
            dispatcher.run(&aliases, &query, out, err).await.exit_code()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogEntry;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["le-query"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn registry(aliases: &[&str]) -> AliasRegistry {
        aliases
            .iter()
            .map(|a| LogEntry::new(*a, "acct", "prod", *a))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_717_243_200_000).unwrap()
    }

    fn plan_for(args: &[&str], aliases: &[&str]) -> Result<Plan, AppError> {
        plan(
            &cli(args),
            &AppConfig::default(),
            &registry(aliases),
            &Palette::plain(),
            now(),
        )
    }

    #[test]
    fn test_plan_listing() {
        assert_eq!(plan_for(&[], &["a", "b"]).unwrap(), Plan::Listing);
    }

    #[test]
    fn test_plan_unknown_alias() {
        let err = plan_for(&["-l", "a", "-l", "missing"], &["a"]).unwrap_err();
        match err {
            AppError::UnknownAlias(e) => assert_eq!(e.aliases, vec!["missing".to_string()]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plan_invalid_start() {
        let err = plan_for(&["--start", "nope"], &["a"]).unwrap_err();
        assert!(matches!(err, AppError::Query(QueryError::InvalidStart(_))));
    }

    #[test]
    fn test_plan_multi_log_prefixes_alias() {
        let plan = plan_for(&["-l", "a", "-l", "b"], &["a", "b"]).unwrap();
        let Plan::Query { renderer, aliases, .. } = plan else {
            panic!("expected query plan");
        };
        assert_eq!(aliases, vec!["a".to_string(), "b".to_string()]);
        let entry = LogEntry::new("a", "acct", "prod", "a");
        let line = renderer.render(&entry, &crate::log_entry::Record::new(0, "msg"));
        assert_eq!(line, "a: msg");
    }

    #[test]
    fn test_build_registry_no_logs() {
        let mut err = Vec::new();
        let result = build_registry(&Accounts::default(), Path::new("/cfg.toml"), &mut err);
        assert!(matches!(result, Err(AppError::Config(ConfigError::NoLogs(_)))));
    }

    #[test]
    fn test_report_config_error_has_hint() {
        let mut err = Vec::new();
        report_error(
            &mut err,
            &AppError::Config(ConfigError::NotFound("/x/config.toml".into())),
        );
        let text = String::from_utf8(err).unwrap();
        assert!(text.contains("le-query: config file not found: /x/config.toml"));
        assert!(text.contains("initial setup"));
    }

    #[test]
    fn test_report_unknown_alias() {
        let mut err = Vec::new();
        report_error(
            &mut err,
            &AppError::UnknownAlias(UnknownAliasError {
                aliases: vec!["x".to_string()],
            }),
        );
        assert_eq!(String::from_utf8(err).unwrap(), "le-query: unknown log alias: x\n");
    }
}
