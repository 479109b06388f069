use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// Text format of the `synthetic_timestamp` column.
pub const SYNTHETIC_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Anchor used when nothing else is configured: midnight, 2021-01-01.
pub fn default_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Synthetic timestamp of the row at `index`, one second per row after `base`.
pub fn synthetic_at(base: NaiveDateTime, index: u64) -> NaiveDateTime {
    let seconds = i64::try_from(index).unwrap_or(i64::MAX);
    base.checked_add_signed(Duration::seconds(seconds))
        .unwrap_or(NaiveDateTime::MAX)
}

pub fn format_synthetic(ts: NaiveDateTime) -> String {
    ts.format(SYNTHETIC_FORMAT).to_string()
}

/// `YYYY-MM` bucket used by the monthly histograms.
pub fn month_key(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m").to_string()
}

/// Parses the timestamp spellings found in augmented files and range requests.
/// Offsets are folded into UTC.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    static FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Serde adapter: writes `YYYY-MM-DDTHH:MM:SS`, reads anything
/// [`parse_timestamp`] understands.
pub mod flexible {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&ts.format("%Y-%m-%dT%H:%M:%S"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_synthetic_and_iso_spellings() {
        let expected = default_epoch() + Duration::seconds(61);
        assert_eq!(parse_timestamp("2021-01-01 00:01:01"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T00:01:01"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T00:01:01.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T02:01:01+02:00"), Some(expected));
        assert_eq!(parse_timestamp("not a time"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn synthetic_offsets_are_one_second_per_row() {
        let base = default_epoch();
        assert_eq!(format_synthetic(synthetic_at(base, 0)), "2021-01-01 00:00:00");
        assert_eq!(format_synthetic(synthetic_at(base, 86_401)), "2021-01-02 00:00:01");
        assert_eq!(month_key(synthetic_at(base, 31 * 86_400)), "2021-02");
    }
}
