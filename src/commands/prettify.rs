use anyhow::{Context, Result, bail};
use chrono::{Local, TimeZone};
use log::info;
use serde_json::Value;
use std::fmt::Display;

use crate::batch::{self, trade_time, ItemError, Payload, Record};
use crate::cli::PrettifyArgs;
use crate::timefmt::{self, TimeFormats};

/// Which transactions of an item to process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessMode {
    #[default]
    All,
    First,
    Last,
    LatestTime,
    EarliestTime,
}

impl ProcessMode {
    /// Unknown codes process everything.
    pub fn from_code(code: &str) -> Self {
        match code {
            "first" => ProcessMode::First,
            "last" => ProcessMode::Last,
            "latest_time" => ProcessMode::LatestTime,
            "earliest_time" => ProcessMode::EarliestTime,
            _ => ProcessMode::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrettifyOptions {
    pub mode: ProcessMode,
    pub formats: TimeFormats,
}

impl From<&PrettifyArgs> for PrettifyOptions {
    fn from(args: &PrettifyArgs) -> Self {
        Self {
            mode: ProcessMode::from_code(&args.mode),
            formats: TimeFormats {
                include_iso: !args.no_iso,
                include_local: !args.no_local,
                include_utc: !args.no_utc,
                include_custom: !args.no_custom,
            },
        }
    }
}

/// The transaction list of an item: the first inner array of a nested
/// payload, or the payload array itself.
pub fn extract_transactions(index: usize, payload: Payload) -> Result<Vec<Value>> {
    let transactions = match payload {
        Payload::NestedArray { first, .. } => first,
        Payload::Array(values) => values,
        Payload::Single(map) => bail!(
            "Could not find transaction array in item {}. Structure: {}",
            index,
            Value::Object(map)
        ),
        Payload::Scalar(value) => bail!(
            "Could not find transaction array in item {}. Structure: {}",
            index,
            value
        ),
    };

    if transactions.is_empty() {
        bail!("No transactions found in item {}", index);
    }
    Ok(transactions)
}

fn time_of(transaction: &Value) -> Result<f64> {
    trade_time(transaction).with_context(|| format!("Transaction has no numeric time field: {}", transaction))
}

/// Left-to-right reduction keeping the current pick unless `replaces(candidate, pick)`.
/// Ties keep the first occurrence.
fn extreme_by_time(transactions: Vec<Value>, replaces: fn(f64, f64) -> bool) -> Result<Value> {
    let mut iter = transactions.into_iter();
    let mut pick = iter.next().context("No transactions to select from")?;
    let mut pick_time = time_of(&pick)?;

    for candidate in iter {
        let time = time_of(&candidate)?;
        if replaces(time, pick_time) {
            pick = candidate;
            pick_time = time;
        }
    }
    Ok(pick)
}

/// Apply `mode` to a non-empty transaction list.
pub fn select(transactions: Vec<Value>, mode: ProcessMode) -> Result<Vec<Value>> {
    let selected = match mode {
        ProcessMode::All => return Ok(transactions),
        ProcessMode::First => transactions.into_iter().next(),
        ProcessMode::Last => transactions.into_iter().last(),
        ProcessMode::LatestTime => Some(extreme_by_time(transactions, |t, best| t > best)?),
        ProcessMode::EarliestTime => Some(extreme_by_time(transactions, |t, best| t < best)?),
    };
    Ok(selected.into_iter().collect())
}

/// Copy of `transaction` with `originalTime`, `parsedTime` and `readableTime`.
pub fn prettify_transaction<Tz>(transaction: &Value, formats: &TimeFormats, zone: &Tz) -> Result<Value>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = transaction
        .as_object()
        .cloned()
        .with_context(|| format!("Transaction is not an object: {}", transaction))?;
    let time = time_of(transaction)?;
    let parsed = timefmt::derive_timestamps(time, formats, zone)?;

    out.insert("originalTime".into(), transaction["time"].clone());
    if let Some(readable) = timefmt::readable_time(&parsed) {
        out.insert("readableTime".into(), readable);
    } else {
        out.remove("readableTime");
    }
    out.insert("parsedTime".into(), Value::Object(parsed));
    Ok(Value::Object(out))
}

fn prettify_item<Tz>(index: usize, item: &Record, options: &PrettifyOptions, zone: &Tz) -> Result<Vec<Value>>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let transactions = extract_transactions(index, Payload::from(item.json.clone()))?;
    let selected = select(transactions, options.mode)?;

    let processed = selected
        .iter()
        .map(|tx| prettify_transaction(tx, &options.formats, zone))
        .collect::<Result<Vec<_>>>()?;

    Ok(match options.mode {
        ProcessMode::All => processed,
        _ => processed.into_iter().take(1).collect(),
    })
}

/// Select and annotate the transactions of every item, local renderings in `zone`.
pub fn prettify_batch<Tz>(items: &[Record], options: &PrettifyOptions, zone: &Tz) -> Result<Vec<Record>, ItemError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let processed = prettify_item(index, item, options, zone).map_err(|e| ItemError::new(index, e))?;
        out.extend(processed.into_iter().map(|tx| Record::new(tx, index)));
    }
    Ok(out)
}

pub fn execute(args: PrettifyArgs) -> Result<()> {
    let options = PrettifyOptions::from(&args);
    let items = batch::load_batch(args.batch.input.as_deref(), args.batch.raw)?.unwrap_or_default();
    info!("items = {}, mode = {:?}, formats = {:?}", items.len(), options.mode, options.formats);

    let records = prettify_batch(&items, &options, &Local)?;
    batch::write_batch(&records, args.batch.output.as_deref())
}
