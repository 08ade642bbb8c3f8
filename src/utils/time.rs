//! Wall clock helpers. Schedule cursors and traces use unix seconds; job
//! creation and request signatures use milliseconds.

use jiff::Timestamp;

pub fn now_secs() -> i64 {
    Timestamp::now().as_second()
}

pub fn now_millis() -> i64 {
    Timestamp::now().as_millisecond()
}

/// Render unix seconds for detail lines and alerts.
pub fn format_secs(secs: i64) -> String {
    Timestamp::from_second(secs)
        .map(|ts| ts.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| secs.to_string())
}
