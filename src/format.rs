//! Display templates for log records.
//!
//! A template such as `"%t %l: %m"` is tokenized once by [`compile`] into a
//! [`Renderer`]: a flat list of pre-styled literal text and field slots.
//! Rendering a record then only copies strings and formats the timestamp,
//! without looking at the template again.
//!
//! | Placeholder | Field                  |
//! |-------------|------------------------|
//! | `%l`        | alias                  |
//! | `%L`        | log name               |
//! | `%S`        | logset name            |
//! | `%A`        | account name           |
//! | `%m`        | message body           |
//! | `%t`        | record time            |
//!
//! Any other `%x` sequence is kept as literal text.

use std::io::IsTerminal;

use chrono::{DateTime, Local, Utc};
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::Command;

use crate::log_entry::{LogEntry, Record};

/// Layout for `%t`: ISO 8601 with a numeric offset, independent of locale.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Shown for `%t` when the record time is out of range.
const INVALID_TIME: &str = "Invalid date";

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

/// ANSI escape sequences used for styled output.
///
/// When colors are off (piped output or `--no-color`), every field is an
/// empty string so that no escape sequences leak into downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// Alias and other log identity fields.
    pub alias: String,
    /// Record timestamps.
    pub time: String,
    /// Stream error notices.
    pub error: String,
    /// Secondary details such as `logset/log` in the alias listing.
    pub detail: String,
    /// Reset all attributes.
    pub reset: String,
}

fn ansi(command: impl Command) -> String {
    let mut seq = String::new();
    // Writing into a String cannot fail.
    let _ = command.write_ansi(&mut seq);
    seq
}

impl Palette {
    /// Color codes for an interactive terminal.
    pub fn for_tty() -> Self {
        Self {
            alias: ansi(SetForegroundColor(Color::Yellow)),
            time: ansi(SetForegroundColor(Color::Cyan)),
            error: ansi(SetForegroundColor(Color::Red)),
            detail: ansi(SetForegroundColor(Color::DarkGrey)),
            reset: ansi(ResetColor),
        }
    }

    /// No-op color codes for piped output.
    pub fn plain() -> Self {
        Self {
            alias: String::new(),
            time: String::new(),
            error: String::new(),
            detail: String::new(),
            reset: String::new(),
        }
    }

    /// Colors when wanted and stdout is a terminal, plain otherwise.
    pub fn detect(color: bool) -> Self {
        if color && std::io::stdout().is_terminal() {
            Self::for_tty()
        } else {
            Self::plain()
        }
    }

    /// Wrap `text` in `style` and a reset.
    pub fn paint(&self, style: &str, text: &str) -> String {
        format!("{}{}{}", style, text, self.reset)
    }
}

// ---------------------------------------------------------------------------
// Template selection
// ---------------------------------------------------------------------------

/// Inputs that decide which template is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateOptions {
    /// Explicit template; empty counts as not given.
    pub format: Option<String>,
    /// Use `"%t %m"` instead of `"%m"` when no template is given.
    pub show_time: bool,
    /// `--log-name` (`Some(true)`) / `--no-log-name` (`Some(false)`).
    pub log_name: Option<bool>,
    /// Number of logs queried at once.
    pub log_count: usize,
}

/// Pick the template and prefix it with `"%l: "` where needed.
///
/// The alias prefix is added when alias display is forced and the template
/// does not start with an alias placeholder, or when several logs are
/// queried, alias display is not suppressed, and the template has no alias
/// placeholder anywhere. Both checks accept `%l` and `%L`.
pub fn resolve_template(opts: &TemplateOptions) -> String {
    let template = match opts.format.as_deref() {
        Some(fmt) if !fmt.is_empty() => fmt.to_string(),
        _ if opts.show_time => "%t %m".to_string(),
        _ => "%m".to_string(),
    };

    let starts_with_alias = template.starts_with("%l") || template.starts_with("%L");
    let has_alias = template.contains("%l") || template.contains("%L");

    let forced = opts.log_name == Some(true) && !starts_with_alias;
    let implied = opts.log_name != Some(false) && opts.log_count > 1 && !has_alias;

    if forced || implied {
        format!("%l: {}", template)
    } else {
        template
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Alias,
    Log,
    Logset,
    Account,
    Message,
    Time,
}

impl Field {
    fn from_specifier(c: char) -> Option<Self> {
        match c {
            'l' => Some(Field::Alias),
            'L' => Some(Field::Log),
            'S' => Some(Field::Logset),
            'A' => Some(Field::Account),
            'm' => Some(Field::Message),
            't' => Some(Field::Time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field(Field),
}

fn tokenize(template: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            if let Some(field) = chars.peek().copied().and_then(Field::from_specifier) {
                chars.next();
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Field(field));
                continue;
            }
        }
        literal.push(c);
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Field(Field),
}

/// A compiled template. Build it once with [`compile`], then call
/// [`Renderer::render`] for every record of every log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderer {
    pieces: Vec<Piece>,
    utc: bool,
    text_len: usize,
}

/// Compile `template` into a [`Renderer`].
///
/// Never fails: unknown placeholders stay literal. Style sequences from
/// `palette` are folded into the literal pieces here, so rendering does
/// no styling work. `utc` renders `%t` in UTC instead of local time.
pub fn compile(template: &str, palette: &Palette, utc: bool) -> Renderer {
    let mut pieces: Vec<Piece> = Vec::new();

    fn push_text(pieces: &mut Vec<Piece>, text: &str) {
        if text.is_empty() {
            return;
        }
        match pieces.last_mut() {
            Some(Piece::Text(prev)) => prev.push_str(text),
            _ => pieces.push(Piece::Text(text.to_string())),
        }
    }

    for token in tokenize(template) {
        match token {
            Token::Literal(text) => push_text(&mut pieces, &text),
            Token::Field(field) => {
                let style = match field {
                    Field::Alias | Field::Log | Field::Logset | Field::Account => {
                        Some(palette.alias.as_str())
                    }
                    Field::Time => Some(palette.time.as_str()),
                    Field::Message => None,
                };
                match style {
                    Some(style) => {
                        push_text(&mut pieces, style);
                        pieces.push(Piece::Field(field));
                        push_text(&mut pieces, &palette.reset);
                    }
                    None => pieces.push(Piece::Field(field)),
                }
            }
        }
    }

    let text_len = pieces
        .iter()
        .map(|p| match p {
            Piece::Text(t) => t.len(),
            Piece::Field(_) => 0,
        })
        .sum();

    Renderer {
        pieces,
        utc,
        text_len,
    }
}

impl Renderer {
    /// Render one record of the log described by `entry`.
    pub fn render(&self, entry: &LogEntry, record: &Record) -> String {
        let mut line = String::with_capacity(self.text_len + record.m.len());
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => line.push_str(text),
                Piece::Field(Field::Alias) => line.push_str(&entry.alias),
                Piece::Field(Field::Log) => line.push_str(&entry.log),
                Piece::Field(Field::Logset) => line.push_str(&entry.logset),
                Piece::Field(Field::Account) => line.push_str(&entry.account),
                Piece::Field(Field::Message) => line.push_str(&record.m),
                Piece::Field(Field::Time) => line.push_str(&self.format_time(record.t)),
            }
        }
        line
    }

    fn format_time(&self, millis: i64) -> String {
        let Some(instant) = DateTime::<Utc>::from_timestamp_millis(millis) else {
            return INVALID_TIME.to_string();
        };
        if self.utc {
            instant.format(TIME_FORMAT).to_string()
        } else {
            instant.with_timezone(&Local).format(TIME_FORMAT).to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry() -> LogEntry {
        LogEntry::new("app", "acct-key", "production", "web")
    }

    fn render_plain(template: &str, record: &Record) -> String {
        compile(template, &Palette::plain(), true).render(&entry(), record)
    }

    // -- Rendering ------------------------------------------------------------

    #[test]
    fn test_alias_and_message() {
        let line = render_plain("%l: %m", &Record::new(0, "boot ok"));
        assert_eq!(line, "app: boot ok");
    }

    #[test]
    fn test_all_identity_fields() {
        let line = render_plain("[%A/%S/%L] %l %m", &Record::new(0, "hi"));
        assert_eq!(line, "[acct-key/production/web] app hi");
    }

    #[test]
    fn test_time_utc() {
        let line = render_plain("%t %m", &Record::new(1_704_067_200_000, "x"));
        assert_eq!(line, "2024-01-01T00:00:00+00:00 x");
    }

    #[test]
    fn test_time_local_matches_chrono_local() {
        let renderer = compile("%t", &Palette::plain(), false);
        let expected = DateTime::<Utc>::from_timestamp_millis(1_704_067_200_000)
            .unwrap()
            .with_timezone(&Local)
            .format(TIME_FORMAT)
            .to_string();
        assert_eq!(
            renderer.render(&entry(), &Record::new(1_704_067_200_000, "")),
            expected
        );
    }

    #[test]
    fn test_time_out_of_range() {
        let line = render_plain("%t", &Record::new(i64::MAX, ""));
        assert_eq!(line, INVALID_TIME);
    }

    #[rstest]
    #[case("%x %m", "%x msg")]
    #[case("100% %m", "100% msg")]
    #[case("%m %", "msg %")]
    #[case("%%m", "%msg")]
    #[case("plain text", "plain text")]
    #[case("", "")]
    fn test_literals_pass_through(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(render_plain(template, &Record::new(0, "msg")), expected);
    }

    #[test]
    fn test_renderer_is_reusable() {
        let renderer = compile("%l> %m", &Palette::plain(), true);
        let other = LogEntry::new("db", "acct-key", "production", "postgres");
        assert_eq!(renderer.render(&entry(), &Record::new(0, "one")), "app> one");
        assert_eq!(renderer.render(&other, &Record::new(0, "two")), "db> two");
    }

    #[test]
    fn test_tty_palette_styles_fields_not_message() {
        let palette = Palette::for_tty();
        let renderer = compile("%l: %m", &palette, true);
        let line = renderer.render(&entry(), &Record::new(0, "boot ok"));
        assert_eq!(
            line,
            format!("{}app{}: boot ok", palette.alias, palette.reset)
        );
        assert!(line.contains("\x1b["));
    }

    #[test]
    fn test_plain_palette_is_empty() {
        let palette = Palette::plain();
        assert!(palette.alias.is_empty());
        assert!(palette.time.is_empty());
        assert!(palette.error.is_empty());
        assert!(palette.detail.is_empty());
        assert!(palette.reset.is_empty());
        assert_eq!(palette.paint(&palette.error, "boom"), "boom");
    }

    #[test]
    fn test_tty_palette_has_escapes() {
        let palette = Palette::for_tty();
        assert!(palette.alias.starts_with("\x1b["));
        assert!(palette.time.starts_with("\x1b["));
        assert!(palette.error.starts_with("\x1b["));
        assert!(palette.reset.starts_with("\x1b["));
    }

    // -- Tokenizer ------------------------------------------------------------

    #[test]
    fn test_tokenize_merges_literals() {
        assert_eq!(
            tokenize("a%qb%m"),
            vec![
                Token::Literal("a%qb".to_string()),
                Token::Field(Field::Message)
            ]
        );
    }

    #[test]
    fn test_tokenize_is_case_sensitive() {
        assert_eq!(
            tokenize("%M%T"),
            vec![Token::Literal("%M%T".to_string())]
        );
    }

    // -- Template selection ---------------------------------------------------

    fn options(
        format: Option<&str>,
        show_time: bool,
        log_name: Option<bool>,
        n: usize,
    ) -> TemplateOptions {
        TemplateOptions {
            format: format.map(str::to_string),
            show_time,
            log_name,
            log_count: n,
        }
    }

    #[rstest]
    #[case(options(None, false, None, 1), "%m")]
    #[case(options(None, true, None, 1), "%t %m")]
    #[case(options(Some(""), true, None, 1), "%t %m")]
    #[case(options(Some("%A %m"), true, None, 1), "%A %m")]
    #[case(options(None, false, None, 2), "%l: %m")]
    #[case(options(None, true, None, 3), "%l: %t %m")]
    #[case(options(None, false, Some(false), 2), "%m")]
    #[case(options(None, false, Some(true), 1), "%l: %m")]
    #[case(options(Some("%t %l %m"), false, None, 2), "%t %l %m")]
    #[case(options(Some("%t %L %m"), false, None, 2), "%t %L %m")]
    #[case(options(Some("%t %l %m"), false, Some(true), 1), "%l: %t %l %m")]
    #[case(options(Some("%l %m"), false, Some(true), 2), "%l %m")]
    #[case(options(Some("%L %m"), false, Some(true), 2), "%L %m")]
    fn test_resolve_template(#[case] opts: TemplateOptions, #[case] expected: &str) {
        assert_eq!(resolve_template(&opts), expected);
    }
}
