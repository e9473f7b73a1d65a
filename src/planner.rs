//! Query planning: which logs to query, and with what query.
//!
//! [`select_logs`] turns the `--log` selection into a validated list of
//! aliases, or asks for the alias listing when nothing was selected and the
//! choice is ambiguous. [`build_query`] derives the time window, filter
//! text and record limit from the remaining arguments against an explicit
//! `now`, so it never reads the clock itself.

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Duration, Utc};

use crate::format::Palette;
use crate::registry::AliasRegistry;
use crate::timespec::{parse_duration, parse_instant};

/// Minutes added to "now" when only a relative window is given, so records
/// that are still being ingested are not cut off.
pub const INGESTION_MARGIN_MINUTES: i64 = 10;

// ---------------------------------------------------------------------------
// Log selection
// ---------------------------------------------------------------------------

/// Outcome of log selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Query these aliases, all known to the registry.
    Logs(Vec<String>),
    /// Nothing selected and more than one log configured: list them instead.
    Listing,
}

/// One or more requested aliases are not in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAliasError {
    pub aliases: Vec<String>,
}

impl fmt::Display for UnknownAliasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .aliases
            .iter()
            .map(|a| if a.is_empty() { "(empty)" } else { a.as_str() })
            .collect();
        write!(
            f,
            "unknown log alias{}: {}",
            if self.aliases.len() > 1 { "es" } else { "" },
            names.join(", ")
        )
    }
}

impl std::error::Error for UnknownAliasError {}

/// Resolve the `--log` selection against the registry.
///
/// Explicit selections are used as given, duplicates included. Without
/// one, a registry with a single alias selects it; otherwise the caller is
/// asked to list the aliases. Every requested alias is checked before
/// anything is returned, and all unknown ones are reported together.
pub fn select_logs(
    registry: &AliasRegistry,
    requested: &[String],
) -> Result<Selection, UnknownAliasError> {
    let selected: Vec<String> = if !requested.is_empty() {
        requested.to_vec()
    } else if registry.len() == 1 {
        registry.aliases().map(str::to_string).collect()
    } else {
        Vec::new()
    };

    let unknown: Vec<String> = selected
        .iter()
        .filter(|alias| !registry.contains(alias))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(UnknownAliasError { aliases: unknown });
    }

    if selected.is_empty() {
        Ok(Selection::Listing)
    } else {
        Ok(Selection::Logs(selected))
    }
}

/// Write the alias listing shown when no log was selected.
pub fn write_listing<W: Write>(
    out: &mut W,
    registry: &AliasRegistry,
    palette: &Palette,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Logs:")?;
    writeln!(out)?;
    for entry in registry.entries() {
        writeln!(
            out,
            " - {} {}{}{}",
            entry.alias,
            palette.detail,
            entry.path(),
            palette.reset
        )?;
    }
    writeln!(out)?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// The query sent to every selected log. Absent fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Query-related command-line arguments, still unparsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs {
    pub filter: Vec<String>,
    pub time: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<String>,
    /// Read offset-less `--start`/`--end` values as UTC.
    pub utc: bool,
}

/// A time bound that could not be parsed or computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidStart(String),
    InvalidEnd(String),
    /// Applying the `--time` duration leaves the representable date range.
    TimeOutOfRange(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidStart(s) => write!(f, "invalid --start time \"{}\"", s),
            QueryError::InvalidEnd(s) => write!(f, "invalid --end time \"{}\"", s),
            QueryError::TimeOutOfRange(s) => write!(f, "--time \"{}\" is out of range", s),
        }
    }
}

impl std::error::Error for QueryError {}

/// Build the query from the arguments, relative to `now`.
///
/// Bounds are derived in this order:
/// 1. A duration alone searches back from `now` up to `now` plus
///    [`INGESTION_MARGIN_MINUTES`].
/// 2. `--start` sets the start; with a duration and no `--end`, the end is
///    `start + duration`.
/// 3. `--end` sets the end; with a duration and no `--start`, the start is
///    `end - duration`.
///
/// With both absolute bounds the duration is ignored. A zero or
/// unparseable duration counts as absent; one that pushes a bound past the
/// representable date range is an error.
pub fn build_query(args: &QueryArgs, now: DateTime<Utc>) -> Result<Query, QueryError> {
    let mut query = Query::default();

    let filter = args.filter.join(" ");
    if !filter.is_empty() {
        query.filter = Some(filter);
    }

    let time = args
        .time
        .as_deref()
        .and_then(parse_duration)
        .filter(|d| !d.is_zero());
    if let (Some(raw), None) = (args.time.as_deref(), time) {
        tracing::debug!(time = raw, "ignoring unparseable or empty duration");
    }

    let start = match args.start.as_deref() {
        Some(s) => Some(
            parse_instant(s, args.utc).ok_or_else(|| QueryError::InvalidStart(s.to_string()))?,
        ),
        None => None,
    };
    let end = match args.end.as_deref() {
        Some(s) => {
            Some(parse_instant(s, args.utc).ok_or_else(|| QueryError::InvalidEnd(s.to_string()))?)
        }
        None => None,
    };

    let out_of_range = || QueryError::TimeOutOfRange(args.time.clone().unwrap_or_default());

    if let Some(time) = time {
        query.start = Some(now.checked_sub_signed(time).ok_or_else(out_of_range)?);
        query.end = now.checked_add_signed(Duration::minutes(INGESTION_MARGIN_MINUTES));
    }

    if let Some(start) = start {
        query.start = Some(start);
        if let (Some(time), None) = (time, end) {
            query.end = Some(start.checked_add_signed(time).ok_or_else(out_of_range)?);
        }
    }

    if let Some(end) = end {
        query.end = Some(end);
        if let (Some(time), None) = (time, start) {
            query.start = Some(end.checked_sub_signed(time).ok_or_else(out_of_range)?);
        }
    }

    query.limit = args.limit.as_deref().map(coerce_limit);

    tracing::debug!(?query, "query built");
    Ok(query)
}

/// Coerce a `--limit` value to a record count.
///
/// Fractions are truncated; negative, non-numeric or empty input becomes 0.
pub fn coerce_limit(raw: &str) -> u64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.trunc().min(u64::MAX as f64) as u64,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
