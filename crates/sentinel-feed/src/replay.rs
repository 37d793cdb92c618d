//! Replay sources for offline runs.
//!
//! Both loaders produce raw wire messages, so a replay goes through the same
//! normalizer as a live feed.

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use async_trait::async_trait;
use sentinel_core::error::FeedError;
use sentinel_core::traits::FeedControl;

use crate::raw::RawMessage;

/// Load a JSON-lines file of raw messages. Blank lines and `#` comments are skipped.
pub fn load_json_lines(path: &Path) -> Result<Vec<String>, FeedError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn io_error(path: &Path, e: std::io::Error) -> FeedError {
    FeedError::Io(format!("{}: {}", path.display(), e))
}

/// CSV bar row.
#[derive(Debug, Deserialize)]
struct CsvBar {
    #[serde(alias = "Date", alias = "date", alias = "timestamp", alias = "Timestamp")]
    date: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", default)]
    volume: f64,
}

/// Load an OHLCV CSV file as bar messages for `symbol`, ordered by time.
pub fn load_csv_bars(path: &Path, symbol: &str) -> Result<Vec<String>, FeedError> {
    let file = std::fs::File::open(path).map_err(|e| io_error(path, e))?;
    read_csv_bars(file, symbol)
}

/// Read OHLCV CSV rows from any reader.
pub fn read_csv_bars<R: Read>(reader: R, symbol: &str) -> Result<Vec<String>, FeedError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (row, result) in reader.deserialize().enumerate() {
        let record: CsvBar = result
            .map_err(|e| FeedError::MalformedEvent(format!("csv row {}: {}", row + 1, e)))?;
        let ts = parse_timestamp(&record.date)?;
        bars.push(RawMessage::Bar {
            symbol: symbol.to_string(),
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
            seq: None,
            ts: Some(ts),
        });
    }

    bars.sort_by_key(|bar| match bar {
        RawMessage::Bar { ts, .. } => ts.unwrap_or_default(),
        _ => 0,
    });
    bars.iter().map(RawMessage::to_json).collect()
}

/// Parse a date, date-time or Unix timestamp (seconds or milliseconds) to Unix ms.
pub fn parse_timestamp(value: &str) -> Result<i64, FeedError> {
    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M"];
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }
    }

    // Unix time, milliseconds past 10 digits
    if let Ok(ts) = value.parse::<i64>() {
        if ts > 10_000_000_000 {
            return Ok(ts);
        }
        return ts.checked_mul(1000).ok_or_else(|| {
            FeedError::MalformedEvent(format!("timestamp out of range: {}", value))
        });
    }

    Err(FeedError::MalformedEvent(format!("could not parse date: {}", value)))
}

/// Feed that replays recorded raw messages.
pub struct ReplayFeed {
    name: String,
    messages: Vec<String>,
    pace: Option<Duration>,
    connected: AtomicBool,
    subscriptions: Mutex<BTreeSet<String>>,
}

impl ReplayFeed {
    pub fn new(name: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            name: name.into(),
            messages,
            pace: None,
            connected: AtomicBool::new(false),
            subscriptions: Mutex::new(BTreeSet::new()),
        }
    }

    /// Wait `pace` between messages instead of replaying as fast as possible.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    /// Send every message to `tx`. Returns the number sent.
    pub async fn run(&self, tx: mpsc::Sender<String>, cancel: CancellationToken) -> Result<usize, FeedError> {
        info!(feed = %self.name, messages = self.messages.len(), "Replay started");
        let mut sent = 0;

        for message in &self.messages {
            if let Some(pace) = self.pace {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pace) => {}
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = tx.send(message.clone()) => {
                    result.map_err(|_| FeedError::Connection("ingress closed".into()))?;
                }
            }
            sent += 1;
        }

        info!(feed = %self.name, sent, "Replay finished");
        Ok(sent)
    }
}

#[async_trait]
impl FeedControl for ReplayFeed {
    async fn connect(&self) -> Result<(), FeedError> {
        self.connected.store(true, Ordering::Relaxed);
        debug!(feed = %self.name, "Replay connected");
        Ok(())
    }

    async fn subscribe(&self, symbol: &str) -> Result<(), FeedError> {
        self.subscriptions.lock().insert(symbol.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<(), FeedError> {
        self.subscriptions.lock().remove(symbol);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
