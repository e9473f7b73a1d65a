//! Remote query backends.
//!
//! A [`QueryBackend`] opens one query for one log and hands back a channel
//! of [`StreamEvent`]s. The backend owns whatever task produces the
//! events and closes the channel when the remote stream ends.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::sync::mpsc;

use crate::log_entry::{parse_record_body, LogEntry, Record};
use crate::planner::Query;

/// Bytes escaped in a URL path segment: everything but RFC 3986 unreserved.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Capacity of each per-log event channel.
pub const STREAM_CHANNEL_CAPACITY: usize = 256;

/// One event from a log's query stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Record(Record),
    /// A failure notice. The stream stays open for further events.
    Error(String),
}

/// Opens query streams against the remote log service.
pub trait QueryBackend {
    /// Start `query` against the log identified by `entry`.
    ///
    /// Must not wait for the query to finish; events arrive on the returned
    /// receiver, which closes when the remote stream ends.
    fn open(&self, entry: &LogEntry, query: &Query) -> mpsc::Receiver<StreamEvent>;
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// Queries the Logentries pull API over HTTP.
///
/// Each log is fetched with one `GET` request; the response is read as a
/// JSON array of records or as newline-delimited JSON records.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/{account}/hosts/{logset}/{log}/`
    pub fn log_url(&self, entry: &LogEntry) -> String {
        format!(
            "{}/{}/hosts/{}/{}/",
            self.base_url,
            encode_segment(&entry.account),
            encode_segment(&entry.logset),
            encode_segment(&entry.log)
        )
    }
}

/// Query-string parameters for `query`. Times are epoch milliseconds.
pub fn query_params(query: &Query) -> Vec<(&'static str, String)> {
    let mut params = vec![("format", "json".to_string())];
    if let Some(start) = query.start {
        params.push(("start", start.timestamp_millis().to_string()));
    }
    if let Some(end) = query.end {
        params.push(("end", end.timestamp_millis().to_string()));
    }
    if let Some(ref filter) = query.filter {
        params.push(("filter", filter.clone()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

impl QueryBackend for HttpBackend {
    fn open(&self, entry: &LogEntry, query: &Query) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let request = self
            .client
            .get(self.log_url(entry))
            .query(&query_params(query));
        let alias = entry.alias.clone();

        tokio::spawn(async move {
            tracing::debug!(alias = %alias, "sending query");
            let body = match request.send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await,
                Ok(resp) => {
                    let status = resp.status();
                    let _ = tx
                        .send(StreamEvent::Error(format!("HTTP status {}", status)))
                        .await;
                    return;
                }
                Err(e) => Err(e),
            };

            let body = match body {
                Ok(body) => body,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            for result in parse_record_body(&body) {
                let event = match result {
                    Ok(record) => StreamEvent::Record(record),
                    Err(e) => StreamEvent::Error(format!("malformed record: {}", e)),
                };
                if tx.send(event).await.is_err() {
                    // Receiver gone; nobody is listening any more.
                    return;
                }
            }
            tracing::debug!(alias = %alias, "query finished");
        });

        rx
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
