use clap::Parser;
use std::path::PathBuf;

use crate::planner::QueryArgs;

/// Query Logentries logs from the command line
#[derive(Parser, Debug, Default)]
#[command(
    name = "le-query",
    version,
    about = "Query Logentries logs from the command line",
    after_help = "Format placeholders: %l alias, %L log name, %S logset, %A account, %m message, %t time"
)]
pub struct Cli {
    /// Free-text filter. All positional arguments are joined with a space.
    pub filter: Vec<String>,

    /// Log alias to query. Repeat to query several logs at once.
    /// Without it, a single configured log is used, or all aliases are listed.
    #[arg(short, long = "log", value_name = "ALIAS")]
    pub log: Vec<String>,

    /// Display template, e.g. "%t %l: %m".
    #[arg(short, long)]
    pub format: Option<String>,

    /// Include the record time in the default template.
    #[arg(long, default_value_t = false)]
    pub show_time: bool,

    /// Always prefix records with the log alias.
    #[arg(long, default_value_t = false, overrides_with = "no_log_name")]
    pub log_name: bool,

    /// Never prefix records with the log alias, even for several logs.
    #[arg(long, default_value_t = false, overrides_with = "log_name")]
    pub no_log_name: bool,

    /// Render and interpret times in UTC instead of local time.
    #[arg(long, default_value_t = false)]
    pub utc: bool,

    /// Length of the search window, e.g. "1h", "30m" or "2 days".
    #[arg(short, long)]
    pub time: Option<String>,

    /// Start of the search window (date/time).
    #[arg(long)]
    pub start: Option<String>,

    /// End of the search window (date/time).
    #[arg(long)]
    pub end: Option<String>,

    /// Maximum number of records to return per log.
    #[arg(short = 'n', long)]
    pub limit: Option<String>,

    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write debug diagnostics to stderr.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, default_value_t = false)]
    pub no_color: bool,
}

impl Cli {
    /// Tri-state alias display: `Some(true)` forced on, `Some(false)` forced
    /// off, `None` when neither flag was given.
    pub fn log_name(&self) -> Option<bool> {
        if self.no_log_name {
            Some(false)
        } else if self.log_name {
            Some(true)
        } else {
            None
        }
    }

    /// The query-related arguments, detached from the rest of the CLI.
    pub fn query_args(&self, utc: bool) -> QueryArgs {
        QueryArgs {
            filter: self.filter.clone(),
            time: self.time.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            limit: self.limit.clone(),
            utc,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
