use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Accepted string formats for timestamp fields, tried in order.
///
/// A bare date resolves to midnight.
pub const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d"];

/// Current UTC time truncated to microsecond precision (6 decimal places).
///
/// PostgreSQL stores microseconds, so truncating here keeps a value written
/// and then read back equal to the one held in memory.
pub fn now() -> NaiveDateTime {
    let now = match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(time) => time,
        Err(_) => std::time::Duration::from_secs(0),
    };

    let timestamp_micros = (now.as_secs() as i64 * 1_000_000) + (now.subsec_micros() as i64);
    let time = if let Some(time) = DateTime::from_timestamp_micros(timestamp_micros) {
        time
    } else {
        DateTime::<Utc>::from_timestamp_nanos(0)
    };
    time.naive_utc()
}

/// Parse a timestamp using [`TIMESTAMP_FORMATS`]; first match wins.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS.iter().find_map(|fmt| {
        // Date-only formats carry no time component for NaiveDateTime to parse.
        NaiveDateTime::parse_from_str(value, fmt).ok().or_else(|| {
            NaiveDate::parse_from_str(value, fmt)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
    })
}
