use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::{json, Value};

use crate::batch::{self, trade_time, Payload, Record};
use crate::cli::FilterArgs;
use crate::timefmt;

/// Named look-back window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeRange {
    #[default]
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
    SevenDays,
}

impl TimeRange {
    pub const ALL: [TimeRange; 6] = [
        TimeRange::FiveMinutes,
        TimeRange::FifteenMinutes,
        TimeRange::OneHour,
        TimeRange::FourHours,
        TimeRange::OneDay,
        TimeRange::SevenDays,
    ];

    /// Unknown codes fall back to five minutes.
    pub fn from_code(code: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|range| range.code() == code)
            .unwrap_or_default()
    }

    pub fn code(self) -> &'static str {
        match self {
            TimeRange::FiveMinutes => "5m",
            TimeRange::FifteenMinutes => "15m",
            TimeRange::OneHour => "1h",
            TimeRange::FourHours => "4h",
            TimeRange::OneDay => "24h",
            TimeRange::SevenDays => "7d",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            TimeRange::FiveMinutes => 5 * 60,
            TimeRange::FifteenMinutes => 15 * 60,
            TimeRange::OneHour => 60 * 60,
            TimeRange::FourHours => 4 * 60 * 60,
            TimeRange::OneDay => 24 * 60 * 60,
            TimeRange::SevenDays => 7 * 24 * 60 * 60,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeRange::FiveMinutes => "last 5 minutes",
            TimeRange::FifteenMinutes => "last 15 minutes",
            TimeRange::OneHour => "last hour",
            TimeRange::FourHours => "last 4 hours",
            TimeRange::OneDay => "last 24 hours",
            TimeRange::SevenDays => "last 7 days",
        }
    }

    /// Oldest epoch second still inside the window.
    pub fn threshold(self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.seconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    pub time_range: TimeRange,
    pub include_filter_info: bool,
    pub return_empty_on_no_results: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            time_range: TimeRange::default(),
            include_filter_info: true,
            return_empty_on_no_results: false,
        }
    }
}

impl From<&FilterArgs> for FilterOptions {
    fn from(args: &FilterArgs) -> Self {
        Self {
            time_range: TimeRange::from_code(&args.time_range),
            include_filter_info: !args.no_filter_info,
            return_empty_on_no_results: args.return_empty,
        }
    }
}

fn in_window(candidate: &Value, threshold: i64) -> bool {
    if !candidate.is_object() {
        return false;
    }
    match trade_time(candidate) {
        Some(time) => time != 0.0 && time >= threshold as f64,
        None => false,
    }
}

/// Candidate trade records carried by one payload.
fn candidates(payload: Payload) -> Vec<Value> {
    match payload {
        Payload::Single(map) => vec![Value::Object(map)],
        Payload::Array(values) => values,
        Payload::NestedArray { first, rest } => std::iter::once(Value::Array(first)).chain(rest).collect(),
        Payload::Scalar(value) => vec![value],
    }
}

fn no_results_record(options: &FilterOptions, now: DateTime<Utc>, threshold: i64) -> Result<Record> {
    let threshold_at = timefmt::from_epoch_seconds(threshold as f64)?;
    Ok(Record::new(
        json!({
            "message": format!("No trades found in the {}", options.time_range.label()),
            "filteredAt": timefmt::iso8601(&now),
            "criteriaUsed": format!("Trades after {}", timefmt::iso8601(&threshold_at)),
            "timeRange": options.time_range.code(),
            "timeThreshold": threshold,
        }),
        0,
    ))
}

/// Keep the trades of every item whose `time` is at or after `now - window`.
pub fn filter_batch(items: &[Record], options: &FilterOptions, now: DateTime<Utc>) -> Result<Vec<Record>> {
    let threshold = options.time_range.threshold(now);
    let mut out = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let before = out.len();
        for trade in candidates(Payload::from(item.json.clone())) {
            if in_window(&trade, threshold) {
                out.push(Record::new(trade, index));
            }
        }
        debug!("item = {}, kept = {}", index, out.len() - before);
    }

    if !out.is_empty() {
        return Ok(out);
    }

    if options.return_empty_on_no_results || !options.include_filter_info {
        return Ok(out);
    }
    let info = no_results_record(options, now, threshold).context("Failed to build the no-results record")?;
    Ok(vec![info])
}

pub fn execute(args: FilterArgs) -> Result<()> {
    let options = FilterOptions::from(&args);
    let items = batch::load_batch(args.batch.input.as_deref(), args.batch.raw)?.unwrap_or_default();
    info!(
        "items = {}, time_range = {}, include_filter_info = {}, return_empty = {}",
        items.len(),
        options.time_range.code(),
        options.include_filter_info,
        options.return_empty_on_no_results
    );

    let records = filter_batch(&items, &options, Utc::now())?;
    batch::write_batch(&records, args.batch.output.as_deref())
}
