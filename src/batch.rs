use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

/// Index of the input item an output record was produced from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

/// One record of a batch: `{"json": <payload>, "pairedItem": {"item": n}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub json: Value,
    #[serde(default)]
    pub paired_item: PairedItem,
}

impl Record {
    pub fn new(json: Value, item: usize) -> Self {
        Self {
            json,
            paired_item: PairedItem { item },
        }
    }
}

/// An item payload, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(Map<String, Value>),
    Array(Vec<Value>),
    /// An array whose first element is itself an array. `rest` holds the
    /// remaining elements as they came, whatever their shape.
    NestedArray { first: Vec<Value>, rest: Vec<Value> },
    Scalar(Value),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Payload::Single(map),
            Value::Array(values) => {
                let mut iter = values.into_iter();
                match iter.next() {
                    Some(Value::Array(first)) => Payload::NestedArray {
                        first,
                        rest: iter.collect(),
                    },
                    Some(head) => Payload::Array(std::iter::once(head).chain(iter).collect()),
                    None => Payload::Array(Vec::new()),
                }
            }
            other => Payload::Scalar(other),
        }
    }
}

/// A fatal failure while processing one item of a batch.
#[derive(Debug, thiserror::Error)]
#[error("Error processing item {index}: {cause:#}")]
pub struct ItemError {
    pub index: usize,
    pub cause: anyhow::Error,
}

impl ItemError {
    pub fn new(index: usize, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            index,
            cause: cause.into(),
        }
    }
}

/// What to do when a single item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    FailFast,
    ContinueOnFail,
}

impl FailurePolicy {
    pub fn from_flag(continue_on_fail: bool) -> Self {
        if continue_on_fail {
            FailurePolicy::ContinueOnFail
        } else {
            FailurePolicy::FailFast
        }
    }

    /// Turn a failure for item `index` into either an `{"error": ...}` record
    /// or a batch-aborting `ItemError`.
    pub fn handle(self, index: usize, cause: anyhow::Error) -> Result<Record, ItemError> {
        match self {
            FailurePolicy::ContinueOnFail => {
                warn!("item = {}, continuing after failure: {:#}", index, cause);
                Ok(Record::new(json!({ "error": format!("{:#}", cause) }), index))
            }
            FailurePolicy::FailFast => Err(ItemError { index, cause }),
        }
    }
}

/// Epoch seconds from a record's `time` field, if it is numeric.
pub fn trade_time(record: &Value) -> Option<f64> {
    record.get("time")?.as_f64()
}

/// Parse batch text. With `raw`, the whole document becomes item 0.
pub fn parse_batch(text: &str, raw: bool) -> Result<Vec<Record>> {
    let document: Value = serde_json::from_str(text).context("Input is not valid JSON")?;
    if raw {
        return Ok(vec![Record::new(document, 0)]);
    }
    serde_json::from_value(document)
        .context("Input must be a JSON array of {\"json\": ..., \"pairedItem\": ...} records (use --raw for plain JSON)")
}

/// Load the input batch from `input`, or stdin when `input` is `None` or `-`.
/// Returns `None` when nothing was supplied (interactive stdin or an empty
/// document).
pub fn load_batch(input: Option<&Path>, raw: bool) -> Result<Option<Vec<Record>>> {
    let text = match input.filter(|path| *path != Path::new("-")) {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?,
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                return Ok(None);
            }
            let mut buf = String::new();
            stdin
                .lock()
                .read_to_string(&mut buf)
                .context("Failed to read batch from stdin")?;
            buf
        }
    };

    if text.trim().is_empty() {
        return Ok(None);
    }

    let records = parse_batch(&text, raw)?;
    debug!("loaded {} input items", records.len());
    Ok(Some(records))
}

/// Write a batch as pretty JSON to `output`, or stdout.
pub fn write_batch(records: &[Record], output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(records).context("Failed to serialize output batch")?;
    match output {
        Some(path) => fs::write(path, text + "\n")
            .with_context(|| format!("Failed to write output file {}", path.display()))?,
        None => println!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_payload_object_is_single() {
        let payload = Payload::from(json!({"time": 1}));
        assert!(matches!(payload, Payload::Single(ref m) if m["time"] == 1));
    }

    #[test]
    fn test_payload_flat_array() {
        let payload = Payload::from(json!([{"time": 1}, {"time": 2}]));
        assert_eq!(payload, Payload::Array(vec![json!({"time": 1}), json!({"time": 2})]));
    }

    #[test]
    fn test_payload_empty_array_is_flat() {
        assert_eq!(Payload::from(json!([])), Payload::Array(vec![]));
    }

    #[test]
    fn test_payload_nested_array() {
        let payload = Payload::from(json!([[{"time": 1}], []]));
        assert_eq!(
            payload,
            Payload::NestedArray {
                first: vec![json!({"time": 1})],
                rest: vec![json!([])],
            }
        );
    }

    #[test]
    fn test_payload_nested_only_looks_at_first_element() {
        let payload = Payload::from(json!([[{"time": 1}], {"time": 2}, 3]));
        assert_eq!(
            payload,
            Payload::NestedArray {
                first: vec![json!({"time": 1})],
                rest: vec![json!({"time": 2}), json!(3)],
            }
        );
        // an inner array later on does not make the payload nested
        let payload = Payload::from(json!([{"time": 2}, [1]]));
        assert_eq!(payload, Payload::Array(vec![json!({"time": 2}), json!([1])]));
    }

    #[test]
    fn test_payload_scalar() {
        assert_eq!(Payload::from(json!(null)), Payload::Scalar(Value::Null));
        assert_eq!(Payload::from(json!("x")), Payload::Scalar(json!("x")));
    }

    #[test]
    fn test_record_serializes_paired_item() {
        let record = Record::new(json!({"a": 1}), 3);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"json": {"a": 1}, "pairedItem": {"item": 3}}));
    }

    #[test]
    fn test_parse_batch_records_without_paired_item() {
        let records = parse_batch(r#"[{"json": {"time": 5}}]"#, false).unwrap();
        assert_eq!(records, vec![Record::new(json!({"time": 5}), 0)]);
    }

    #[test]
    fn test_parse_batch_raw_wraps_document() {
        let records = parse_batch(r#"[{"time": 5}, {"time": 6}]"#, true).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].json, json!([{"time": 5}, {"time": 6}]));
    }

    #[test]
    fn test_parse_batch_rejects_plain_json_without_raw() {
        assert!(parse_batch(r#"[{"time": 5}]"#, false).is_err());
        assert!(parse_batch("not json", true).is_err());
    }

    #[test]
    fn test_failure_policy_continue_emits_error_record() {
        let record = FailurePolicy::ContinueOnFail
            .handle(2, anyhow::anyhow!("boom"))
            .unwrap();
        assert_eq!(record, Record::new(json!({"error": "boom"}), 2));
    }

    #[test]
    fn test_failure_policy_fail_fast_names_item() {
        let err = FailurePolicy::FailFast
            .handle(4, anyhow::anyhow!("boom"))
            .unwrap_err();
        assert_eq!(err.index, 4);
        assert_eq!(err.to_string(), "Error processing item 4: boom");
    }

    #[test]
    fn test_failure_policy_from_flag() {
        assert_eq!(FailurePolicy::from_flag(true), FailurePolicy::ContinueOnFail);
        assert_eq!(FailurePolicy::from_flag(false), FailurePolicy::FailFast);
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
    }

    #[test]
    fn test_trade_time() {
        assert_eq!(trade_time(&json!({"time": 42})), Some(42.0));
        assert_eq!(trade_time(&json!({"time": "42"})), None);
        assert_eq!(trade_time(&json!({})), None);
        assert_eq!(trade_time(&json!(7)), None);
    }

    #[test]
    fn test_load_and_write_batch_files() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        write!(input, r#"[{{"json": {{"time": 1}}, "pairedItem": {{"item": 0}}}}]"#).unwrap();

        let records = load_batch(Some(input.path()), false).unwrap().unwrap();
        assert_eq!(records, vec![Record::new(json!({"time": 1}), 0)]);

        let output = tempfile::NamedTempFile::new().unwrap();
        write_batch(&records, Some(output.path())).unwrap();
        let written = fs::read_to_string(output.path()).unwrap();
        assert_eq!(parse_batch(&written, false).unwrap(), records);
    }

    #[test]
    fn test_load_batch_empty_file_is_none() {
        let input = tempfile::NamedTempFile::new().unwrap();
        assert!(load_batch(Some(input.path()), true).unwrap().is_none());
    }
}
