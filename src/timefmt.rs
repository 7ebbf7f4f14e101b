//! Epoch-second helpers: RFC 3339 rendering for output and lenient parsing for CLI bounds.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Fields rewritten by [`humanize_timestamps`].
const TIMESTAMP_FIELDS: &[&str] = &["created_utc", "retrieved_on", "retrieved_utc", "edited"];

/// `1136074600` -> `2006-01-01T00:16:40Z`. Out-of-range values come back as `None`.
pub fn format_utc(ts: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(ts).ok()?.format(&Rfc3339).ok()
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn humanize_in_place(map: &mut Map<String, Value>, key: &str) {
    if let Some(v) = map.get_mut(key) {
        // "edited" may be `false`; only numeric forms are converted
        if let Some(s) = v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).and_then(format_utc) {
            *v = Value::String(s);
        }
    }
}

/// Rewrites the numeric timestamp fields of a JSON object as RFC 3339 strings.
pub fn humanize_timestamps(val: &mut Value) {
    if let Some(obj) = val.as_object_mut() {
        for key in TIMESTAMP_FIELDS {
            humanize_in_place(obj, key);
        }
    }
}

/// Accepts epoch seconds, RFC 3339, or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_time_arg(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Ok(n);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt.unix_timestamp());
    }
    let day = format_description!("[year]-[month]-[day]");
    Date::parse(s, &day)
        .map(|d| d.midnight().assume_utc().unix_timestamp())
        .map_err(|_| format!("expected epoch seconds, RFC 3339 or YYYY-MM-DD, got {s:?}"))
}
