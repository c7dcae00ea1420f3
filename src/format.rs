use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike};

/// Renders a server timestamp relative to `now`, the way the sidebar shows it.
/// Naive timestamps are taken to be in `now`'s time zone.
pub fn relative_time<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> String {
    let Some(date) = parse_timestamp(raw, &now.timezone()) else {
        return "Invalid date".to_string();
    };

    let elapsed = now.clone().signed_duration_since(date.clone());
    let mins = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let weeks = elapsed.num_weeks();

    if mins < 1 {
        return "Just now".to_string();
    }
    if mins < 60 {
        return plural(mins, "minute");
    }
    if hours < 24 {
        return plural(hours, "hour");
    }
    let today = now.date_naive();
    let day = date.date_naive();
    if today.pred_opt() == Some(day) {
        return "Yesterday".to_string();
    }
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    if day >= week_start {
        return day.format("%A").to_string();
    }
    if weeks < 2 {
        return "Last week".to_string();
    }
    let months = months_between(&date, now);
    if months < 1 {
        return plural(weeks, "week");
    }
    if months < 12 {
        return plural(months, "month");
    }
    plural(months / 12, "year")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Whole calendar months from `from` to `to`, not counting a partial month.
fn months_between<Tz: TimeZone>(from: &DateTime<Tz>, to: &DateTime<Tz>) -> i64 {
    let mut months = (to.year() - from.year()) as i64 * 12 + to.month() as i64 - from.month() as i64;
    let to_key = (to.day(), to.num_seconds_from_midnight());
    let from_key = (from.day(), from.num_seconds_from_midnight());
    if months > 0 && to_key < from_key {
        months -= 1;
    }
    months
}

fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    // The service sometimes writes dates as `YYYY:MM:DD`.
    let mut normalized = raw.to_string();
    let bytes = raw.as_bytes();
    if bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b':'
        && bytes[7] == b':'
    {
        normalized.replace_range(4..5, "-");
        normalized.replace_range(7..8, "-");
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(tz));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return tz.from_local_datetime(&naive).earliest();
        }
    }
    None
}

/// `M:SS` for voice message lengths.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// `MM:SS` for the running recording timer.
pub fn format_timer(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn now() -> DateTime<Utc> {
        // A Thursday.
        Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn recent_times() {
        let now = now();
        assert_eq!(relative_time("2024-05-16 11:59:30", &now), "Just now");
        assert_eq!(relative_time("2024-05-16 11:59:00", &now), "1 minute ago");
        assert_eq!(relative_time("2024:05:16 11:15:00", &now), "45 minutes ago");
        assert_eq!(relative_time("2024-05-16T09:00:00Z", &now), "3 hours ago");
        assert_eq!(relative_time("2024-05-15T13:00:00", &now), "23 hours ago");
    }

    #[test]
    fn calendar_buckets() {
        let now = now();
        assert_eq!(relative_time("2024-05-15 08:00:00", &now), "Yesterday");
        assert_eq!(relative_time("2024-05-13 08:00:00", &now), "Monday");
        assert_eq!(relative_time("2024-05-08 08:00:00", &now), "Last week");
        assert_eq!(relative_time("2024-04-28 08:00:00", &now), "2 weeks ago");
        assert_eq!(relative_time("2024-03-10 08:00:00", &now), "2 months ago");
        assert_eq!(relative_time("2023-05-10 08:00:00", &now), "1 year ago");
        assert_eq!(relative_time("2021-01-01 08:00:00", &now), "3 years ago");
    }

    #[test]
    fn future_and_garbage() {
        let now = now();
        assert_eq!(relative_time("2024-05-17 12:00:00", &now), "Just now");
        assert_eq!(relative_time("yesterday-ish", &now), "Invalid date");
        assert_eq!(relative_time("", &now), "Invalid date");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(f64::NAN), "0:00");
        assert_eq!(format_duration(f64::INFINITY), "0:00");
        assert_eq!(format_duration(2.5), "0:02");
        assert_eq!(format_duration(61.9), "1:01");
        assert_eq!(format_timer(0), "00:00");
        assert_eq!(format_timer(125), "02:05");
    }
}
