use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Which renderings to put into a derived timestamp set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFormats {
    pub include_iso: bool,
    pub include_local: bool,
    pub include_utc: bool,
    pub include_custom: bool,
}

impl Default for TimeFormats {
    fn default() -> Self {
        Self {
            include_iso: true,
            include_local: true,
            include_utc: true,
            include_custom: true,
        }
    }
}

/// Convert epoch seconds (fractions kept to the millisecond) into a UTC datetime.
pub fn from_epoch_seconds(secs: f64) -> Result<DateTime<Utc>> {
    let millis = (secs * 1000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        anyhow::bail!("Timestamp {} is out of range", secs);
    }
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .with_context(|| format!("Timestamp {} is out of range", secs))
}

/// `2023-12-01T10:30:00.000Z`
pub fn iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `Fri, 01 Dec 2023 10:30:00 GMT`
pub fn rfc1123(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build the `parsedTime` map for one epoch value. Local renderings use `zone`.
pub fn derive_timestamps<Tz>(secs: f64, formats: &TimeFormats, zone: &Tz) -> Result<Map<String, Value>>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let utc = from_epoch_seconds(secs)?;
    let local = utc.with_timezone(zone);
    let mut set = Map::new();

    if formats.include_iso {
        set.insert("iso".into(), Value::String(iso8601(&utc)));
    }
    if formats.include_utc {
        set.insert("utc".into(), Value::String(rfc1123(&utc)));
    }
    if formats.include_local {
        set.insert("local".into(), local.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string().into());
        set.insert("dateOnly".into(), local.format("%-m/%-d/%Y").to_string().into());
        set.insert("timeOnly".into(), local.format("%-I:%M:%S %p").to_string().into());
    }
    if formats.include_custom {
        set.insert("custom".into(), local.format("%B %-d, %Y, %I:%M:%S %p").to_string().into());
    }

    Ok(set)
}

/// Preferred human-readable rendering: custom, then local, then ISO.
pub fn readable_time(set: &Map<String, Value>) -> Option<Value> {
    ["custom", "local", "iso"]
        .iter()
        .find_map(|key| set.get(*key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    const DEC_1_2023_1030: f64 = 1_701_426_600.0;

    #[test]
    fn test_iso_and_utc_renderings() {
        let dt = from_epoch_seconds(DEC_1_2023_1030).unwrap();
        assert_eq!(iso8601(&dt), "2023-12-01T10:30:00.000Z");
        assert_eq!(rfc1123(&dt), "Fri, 01 Dec 2023 10:30:00 GMT");
    }

    #[test]
    fn test_fractional_seconds_keep_millis() {
        let dt = from_epoch_seconds(1.5).unwrap();
        assert_eq!(iso8601(&dt), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn test_out_of_range_timestamp() {
        assert!(from_epoch_seconds(1e20).is_err());
        assert!(from_epoch_seconds(f64::NAN).is_err());
    }

    #[test]
    fn test_full_set_in_utc_zone() {
        let set = derive_timestamps(DEC_1_2023_1030, &TimeFormats::default(), &Utc).unwrap();
        assert_eq!(set["iso"], "2023-12-01T10:30:00.000Z");
        assert_eq!(set["utc"], "Fri, 01 Dec 2023 10:30:00 GMT");
        assert_eq!(set["local"], "12/1/2023, 10:30:00 AM");
        assert_eq!(set["dateOnly"], "12/1/2023");
        assert_eq!(set["timeOnly"], "10:30:00 AM");
        assert_eq!(set["custom"], "December 1, 2023, 10:30:00 AM");
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn test_local_renderings_follow_zone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let set = derive_timestamps(DEC_1_2023_1030, &TimeFormats::default(), &tokyo).unwrap();
        assert_eq!(set["local"], "12/1/2023, 7:30:00 PM");
        assert_eq!(set["custom"], "December 1, 2023, 07:30:00 PM");
        // iso/utc never shift
        assert_eq!(set["iso"], "2023-12-01T10:30:00.000Z");
    }

    #[test]
    fn test_disabled_formats_are_omitted() {
        let formats = TimeFormats {
            include_iso: false,
            include_local: false,
            include_utc: true,
            include_custom: false,
        };
        let set = derive_timestamps(DEC_1_2023_1030, &formats, &Utc).unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["utc"]);
        assert_eq!(readable_time(&set), None);
    }

    #[test]
    fn test_readable_time_fallback_all_flag_combinations() {
        for bits in 0u8..16 {
            let formats = TimeFormats {
                include_iso: bits & 1 != 0,
                include_local: bits & 2 != 0,
                include_utc: bits & 4 != 0,
                include_custom: bits & 8 != 0,
            };
            let set = derive_timestamps(DEC_1_2023_1030, &formats, &Utc).unwrap();
            let expected = if formats.include_custom {
                Some(set["custom"].clone())
            } else if formats.include_local {
                Some(set["local"].clone())
            } else if formats.include_iso {
                Some(set["iso"].clone())
            } else {
                None
            };
            assert_eq!(readable_time(&set), expected, "flags {:04b}", bits);
        }
    }
}
