use chrono::{DateTime, NaiveDateTime, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;

use crate::errors::{ParseTimestampError, ParseTimezoneError};

/// Format DataParc uses for timestamps passed as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LOCAL_FORMATS: [&str; 4] = [
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parses an IANA timezone name such as `Asia/Seoul` or `UTC`.
pub fn parse_timezone(name: &str) -> Result<Tz, ParseTimezoneError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ParseTimezoneError(name.to_string()))
}

/// Attaches `tz` to a naive site-local timestamp read back from the historian.
///
/// Ambiguous times resolve to the earlier instant. Times that fall inside a
/// forward transition use the offset in effect just before it, which moves
/// them forward by the length of the gap.
pub fn localize(naive: NaiveDateTime, tz: &Tz) -> DateTime<Tz> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt;
    }
    let before = naive - TimeDelta::days(1);
    match tz.offset_from_local_datetime(&before).earliest() {
        Some(offset) => tz.from_utc_datetime(&(naive - offset.fix())),
        None => tz.from_utc_datetime(&naive),
    }
}

/// Converts any timestamp into the naive wall-clock time of the site timezone.
pub fn to_site_local<T: TimeZone>(timestamp: &DateTime<T>, tz: &Tz) -> NaiveDateTime {
    timestamp.with_timezone(tz).naive_local()
}

/// Renders a naive site-local timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(naive: &NaiveDateTime) -> String {
    naive.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses user input as either RFC 3339 or a site-local `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(raw: &str, tz: &Tz) -> Result<DateTime<Tz>, ParseTimestampError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(tz));
    }
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ParseTimestampError::InvalidFormat(raw.to_string()))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ParseTimestampError::NonexistentLocalTime(raw.to_string(), tz.to_string()))
}
