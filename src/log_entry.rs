use serde::Deserialize;

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// A configured log, resolved from the config file under its alias.
///
/// Built once while the alias registry is constructed and never mutated
/// afterwards. `account`, `logset` and `log` together identify the log on
/// the remote service; `alias` is the short name the user types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub alias: String,
    pub account: String,
    pub logset: String,
    pub log: String,
}

impl LogEntry {
    pub fn new(
        alias: impl Into<String>,
        account: impl Into<String>,
        logset: impl Into<String>,
        log: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            account: account.into(),
            logset: logset.into(),
            log: log.into(),
        }
    }

    /// `logset/log`, as shown in listings and collision warnings.
    pub fn path(&self) -> String {
        format!("{}/{}", self.logset, self.log)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single log record returned by the remote service.
///
/// The service uses single-letter keys: `t` is the record instant in
/// milliseconds since the Unix epoch and `m` is the message body. Any other
/// keys are ignored, and missing keys fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct Record {
    pub t: i64,
    pub m: String,
}

impl Record {
    pub fn new(t: i64, m: impl Into<String>) -> Self {
        Self { t, m: m.into() }
    }
}

/// Parse a single JSON line into a `Record`.
///
/// Returns `Err` for malformed JSON. The caller decides how to report it.
pub fn parse_record_line(line: &str) -> Result<Record, serde_json::Error> {
    serde_json::from_str(line)
}

/// Parse a response body holding either a JSON array of records or
/// newline-delimited JSON records.
///
/// Each element carries its own parse result so that one bad line does not
/// hide the good ones around it. Blank lines are skipped.
pub fn parse_record_body(body: &str) -> Vec<Result<Record, serde_json::Error>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Vec<Record>>(trimmed) {
            Ok(records) => records.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
    }

    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_record_line)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
