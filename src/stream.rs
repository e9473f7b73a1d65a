//! Concurrent fan-out of one query over several logs.
//!
//! Every selected log gets its own stream from the backend, opened up front
//! without waiting on the others. A forwarding task per stream feeds a
//! single coordinator channel; the coordinator renders records to stdout
//! and error notices to stderr as they arrive, and returns once every
//! stream has closed.
//!
//! Order is preserved within one log but not across logs. An error on one
//! stream is reported with that log's alias and fails the run, but never
//! stops the other streams or later records on the same stream.

use std::io::{self, Write};

use tokio::sync::mpsc;

use crate::backend::{QueryBackend, StreamEvent, STREAM_CHANNEL_CAPACITY};
use crate::format::{Palette, Renderer};
use crate::log_entry::LogEntry;
use crate::planner::Query;
use crate::registry::AliasRegistry;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What happened across all streams of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Records written to stdout.
    pub records: usize,
    /// Error notices received from any stream.
    pub errors: usize,
    /// Output stopped early because stdout went away (e.g. broken pipe).
    pub interrupted: bool,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    /// Process exit status: 0 when no stream reported an error, else 1.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs a query against the selected logs and prints the results.
pub struct Dispatcher<'a, B> {
    pub registry: &'a AliasRegistry,
    pub renderer: &'a Renderer,
    pub palette: &'a Palette,
    pub backend: &'a B,
}

impl<'a, B: QueryBackend> Dispatcher<'a, B> {
    pub fn new(
        registry: &'a AliasRegistry,
        renderer: &'a Renderer,
        palette: &'a Palette,
        backend: &'a B,
    ) -> Self {
        Self {
            registry,
            renderer,
            palette,
            backend,
        }
    }

    /// Query every alias in `aliases` concurrently and wait for all streams
    /// to finish.
    ///
    /// Aliases are expected to have been validated already; one that is
    /// missing from the registry is reported like a stream error.
    pub async fn run<O: Write, E: Write>(
        &self,
        aliases: &[String],
        query: &Query,
        out: &mut O,
        err: &mut E,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let (tx, mut rx) = mpsc::channel::<(usize, StreamEvent)>(STREAM_CHANNEL_CAPACITY);
        let mut entries: Vec<&LogEntry> = Vec::with_capacity(aliases.len());

        for alias in aliases {
            let Some(entry) = self.registry.get(alias) else {
                outcome.errors += 1;
                let _ = self.write_error(err, alias, "unknown log alias");
                continue;
            };

            let idx = entries.len();
            entries.push(entry);

            let mut stream = self.backend.open(entry, query);
            let tx = tx.clone();
            tracing::debug!(alias = %entry.alias, log = %entry.path(), "stream opened");
            tokio::spawn(async move {
                while let Some(event) = stream.recv().await {
                    if tx.send((idx, event)).await.is_err() {
                        break;
                    }
                }
            });
        }
        // Only the forwarding tasks hold senders now, so the channel closes
        // once every stream has ended.
        drop(tx);

        while let Some((idx, event)) = rx.recv().await {
            let entry = entries[idx];
            match event {
                // Once stdout is gone, keep draining so later errors still count.
                StreamEvent::Record(_) if outcome.interrupted => {}
                StreamEvent::Record(record) => {
                    let line = self.renderer.render(entry, &record);
                    if let Err(e) = writeln!(out, "{}", line) {
                        tracing::debug!(error = %e, "stdout closed, stopping output");
                        outcome.interrupted = true;
                        continue;
                    }
                    outcome.records += 1;
                }
                StreamEvent::Error(message) => {
                    outcome.errors += 1;
                    tracing::debug!(alias = %entry.alias, error = %message, "stream error");
                    let _ = self.write_error(
                        err,
                        &entry.alias,
                        &format!("Failed to return more logs: {}", message),
                    );
                }
            }
        }

        let _ = out.flush();
        tracing::debug!(?outcome, "dispatch finished");
        outcome
    }

    fn write_error<E: Write>(&self, err: &mut E, alias: &str, message: &str) -> io::Result<()> {
        writeln!(
            err,
            "{}: {}",
            self.palette.paint(&self.palette.alias, alias),
            self.palette.paint(&self.palette.error, message)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::compile;
    use crate::log_entry::Record;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Backend that replays a fixed script of events per log name,
    /// yielding between events so that streams interleave.
    #[derive(Default)]
    struct ScriptedBackend {
        scripts: HashMap<String, Vec<StreamEvent>>,
        opened: RefCell<Vec<String>>,
    }

    impl ScriptedBackend {
        fn with(mut self, log: &str, events: Vec<StreamEvent>) -> Self {
            self.scripts.insert(log.to_string(), events);
            self
        }
    }

    impl QueryBackend for ScriptedBackend {
        fn open(&self, entry: &LogEntry, _query: &Query) -> mpsc::Receiver<StreamEvent> {
            self.opened.borrow_mut().push(entry.alias.clone());
            let events = self.scripts.get(&entry.log).cloned().unwrap_or_default();
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    tokio::task::yield_now().await;
                }
            });
            rx
        }
    }

    /// Writer that fails every write, like a closed pipe.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn registry() -> AliasRegistry {
        vec![
            LogEntry::new("app", "acct", "prod", "web"),
            LogEntry::new("db", "acct", "prod", "postgres"),
        ]
        .into_iter()
        .collect()
    }

    fn record(m: &str) -> StreamEvent {
        StreamEvent::Record(Record::new(0, m))
    }

    fn aliases(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn run(
        backend: &ScriptedBackend,
        selected: &[&str],
        template: &str,
    ) -> (DispatchOutcome, String, String) {
        let registry = registry();
        let palette = Palette::plain();
        let renderer = compile(template, &palette, true);
        let dispatcher = Dispatcher::new(&registry, &renderer, &palette, backend);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = dispatcher
            .run(&aliases(selected), &Query::default(), &mut out, &mut err)
            .await;
        (
            outcome,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_single_log_records_in_order() {
        let backend = ScriptedBackend::default()
            .with("web", vec![record("one"), record("two"), record("three")]);
        let (outcome, out, err) = run(&backend, &["app"], "%m").await;
        assert_eq!(out, "one\ntwo\nthree\n");
        assert!(err.is_empty());
        assert_eq!(outcome.records, 3);
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_error_on_one_log_does_not_stop_other() {
        let backend = ScriptedBackend::default()
            .with("web", vec![StreamEvent::Error("timeout".to_string())])
            .with("postgres", vec![record("a"), record("b"), record("c")]);
        let (outcome, out, err) = run(&backend, &["app", "db"], "%l: %m").await;

        let mut lines: Vec<&str> = out.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["db: a", "db: b", "db: c"]);
        assert_eq!(err, "app: Failed to return more logs: timeout\n");
        assert_eq!(outcome.records, 3);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_records_continue_after_error_on_same_stream() {
        let backend = ScriptedBackend::default().with(
            "web",
            vec![
                record("before"),
                StreamEvent::Error("hiccup".to_string()),
                record("after"),
            ],
        );
        let (outcome, out, err) = run(&backend, &["app"], "%m").await;
        assert_eq!(out, "before\nafter\n");
        assert!(err.contains("hiccup"));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_per_stream_order_preserved_when_interleaved() {
        let backend = ScriptedBackend::default()
            .with("web", (0..20).map(|i| record(&format!("w{}", i))).collect())
            .with("postgres", (0..20).map(|i| record(&format!("p{}", i))).collect());
        let (_, out, _) = run(&backend, &["app", "db"], "%m").await;

        let web: Vec<&str> = out.lines().filter(|l| l.starts_with('w')).collect();
        let pg: Vec<&str> = out.lines().filter(|l| l.starts_with('p')).collect();
        let expected_web: Vec<String> = (0..20).map(|i| format!("w{}", i)).collect();
        let expected_pg: Vec<String> = (0..20).map(|i| format!("p{}", i)).collect();
        assert_eq!(web, expected_web);
        assert_eq!(pg, expected_pg);
    }

    #[tokio::test]
    async fn test_every_selected_stream_is_opened() {
        let backend = ScriptedBackend::default();
        let (outcome, out, _) = run(&backend, &["db", "app", "db"], "%m").await;
        assert_eq!(*backend.opened.borrow(), aliases(&["db", "app", "db"]));
        assert!(out.is_empty());
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_unknown_alias_reported_as_error() {
        let backend = ScriptedBackend::default().with("web", vec![record("x")]);
        let (outcome, out, err) = run(&backend, &["app", "ghost"], "%m").await;
        assert_eq!(out, "x\n");
        assert_eq!(err, "ghost: unknown log alias\n");
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_no_aliases_is_immediate_success() {
        let backend = ScriptedBackend::default();
        let (outcome, out, err) = run(&backend, &[], "%m").await;
        assert_eq!(outcome, DispatchOutcome::default());
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_closed_stdout_stops_cleanly() {
        let backend = ScriptedBackend::default().with("web", vec![record("a"), record("b")]);
        let registry = registry();
        let palette = Palette::plain();
        let renderer = compile("%m", &palette, true);
        let dispatcher = Dispatcher::new(&registry, &renderer, &palette, &backend);
        let mut err = Vec::new();
        let outcome = dispatcher
            .run(&aliases(&["app"]), &Query::default(), &mut ClosedPipe, &mut err)
            .await;
        assert!(outcome.interrupted);
        assert_eq!(outcome.records, 0);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_error_after_closed_stdout_still_fails_run() {
        let backend = ScriptedBackend::default().with(
            "web",
            vec![
                record("a"),
                record("b"),
                StreamEvent::Error("reset".to_string()),
            ],
        );
        let registry = registry();
        let palette = Palette::plain();
        let renderer = compile("%m", &palette, true);
        let dispatcher = Dispatcher::new(&registry, &renderer, &palette, &backend);
        let mut err = Vec::new();
        let outcome = dispatcher
            .run(&aliases(&["app"]), &Query::default(), &mut ClosedPipe, &mut err)
            .await;
        assert!(outcome.interrupted);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "app: Failed to return more logs: reset\n"
        );
    }

    #[test]
    fn test_exit_code() {
        let ok = DispatchOutcome {
            records: 5,
            ..Default::default()
        };
        let failed = DispatchOutcome {
            errors: 2,
            ..Default::default()
        };
        assert_eq!(ok.exit_code(), 0);
        assert_eq!(failed.exit_code(), 1);
    }
}
