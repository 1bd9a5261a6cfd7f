//! Cache key formats. These strings are shared with existing deployments and
//! must not change.

/// Daily mass readings: `mass:{date}`.
pub fn mass_readings(date: &str) -> String {
    format!("mass:{date}")
}

/// Scripture reading for a date: `{date}:{reading_title}`.
pub fn scripture(date: &str, reading_title: &str) -> String {
    format!("{date}:{reading_title}")
}

/// Saint of the day: `saint:{date}`.
pub fn saint(date: &str) -> String {
    format!("saint:{date}")
}

/// Bible study of a reading: `reading:{date}: {reading_title}` (note the space).
pub fn bible_study(date: &str, reading_title: &str) -> String {
    format!("reading:{date}: {reading_title}")
}
