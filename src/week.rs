use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// Friday anchoring the Monday-based week that contains `date`. Monday through
/// Friday map forward to that week's Friday; Saturday and Sunday map back to
/// the Friday just passed.
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let days_to_friday = 4 - date.weekday().num_days_from_monday() as i64;
    date + Duration::days(days_to_friday)
}

/// Signed whole-week distance from `date`'s week-ending Friday to the event's
/// week-ending Friday. 0 is the event week, positive is before the event.
/// Rounded, not truncated, so sub-day drift cannot move a bucket.
pub fn weeks_before_event(date: NaiveDate, event_week_ending: NaiveDate) -> i32 {
    let days = (event_week_ending - week_ending(date)).num_days();
    (days as f64 / 7.0).round() as i32
}

/// Parse an upstream timestamp string as campaign-local wall-clock time.
///
/// Accepts RFC 3339 (offset suffixes are read as-written), `YYYY-MM-DDTHH:MM:SS`,
/// `YYYY-MM-DD HH:MM:SS`, and bare `YYYY-MM-DD`. Empty strings and the
/// `0000-00-00` placeholder some upstream exports emit come back as `None`.
pub fn parse_civil_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with("0000-00-00") {
        return None;
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return parsed.and_hms_opt(0, 0, 0);
    }
    None
}

/// Parse a user-supplied projection date, either `YYYY-MM-DD` or `MM-DD`.
/// The result is always pinned to `target_year` so a date copied from a prior
/// season lands in the campaign being reported.
pub fn parse_projection_date(value: &str, target_year: i32) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let iso = if trimmed.len() == 5 && trimmed.as_bytes()[2] == b'-' {
        format!("{target_year}-{trimmed}")
    } else {
        trimmed.to_string()
    };
    let parsed = NaiveDate::parse_from_str(&iso, "%Y-%m-%d").ok()?;
    parsed.with_year(target_year)
}

/// Lenient boolean coercion for upstream flag columns that arrive as text.
pub fn coerce_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn week_ending_is_always_a_friday() {
        // 2025-06-02 is a Monday; walk a full week.
        for day in 0..7 {
            let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap() + Duration::days(day);
            assert_eq!(week_ending(date).weekday(), Weekday::Fri);
        }
    }

    #[test]
    fn week_ending_is_idempotent() {
        for day in 0..14 {
            let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap() + Duration::days(day);
            let friday = week_ending(date);
            assert_eq!(week_ending(friday), friday);
        }
    }

    #[test]
    fn weekend_days_anchor_to_the_friday_just_passed() {
        let friday = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        assert_eq!(week_ending(saturday), friday);
        assert_eq!(week_ending(sunday), friday);
    }

    #[test]
    fn weeks_before_event_counts_whole_weeks() {
        let event_week = NaiveDate::from_ymd_opt(2025, 9, 12).unwrap();
        let three_weeks_out = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();
        assert_eq!(weeks_before_event(three_weeks_out, event_week), 3);
        assert_eq!(weeks_before_event(event_week, event_week), 0);
        let week_after = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        assert_eq!(weeks_before_event(week_after, event_week), -1);
    }

    #[test]
    fn parses_common_upstream_timestamp_shapes() {
        assert!(parse_civil_datetime("2025-03-14T09:30:00+11:00").is_some());
        assert!(parse_civil_datetime("2025-03-14T09:30:00Z").is_some());
        assert!(parse_civil_datetime("2025-03-14 09:30:00").is_some());
        assert!(parse_civil_datetime("2025-03-14").is_some());
        assert_eq!(
            parse_civil_datetime("2025-03-14 09:30:00").map(|dt| dt.date()),
            NaiveDate::from_ymd_opt(2025, 3, 14)
        );
    }

    #[test]
    fn rejects_placeholder_and_garbage_dates() {
        assert!(parse_civil_datetime("").is_none());
        assert!(parse_civil_datetime("   ").is_none());
        assert!(parse_civil_datetime("0000-00-00 00:00:00").is_none());
        assert!(parse_civil_datetime("not a date").is_none());
    }

    #[test]
    fn offset_timestamps_keep_their_wall_clock() {
        let parsed = parse_civil_datetime("2025-03-14T23:30:00+11:00").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn projection_date_accepts_month_day_and_pins_year() {
        assert_eq!(
            parse_projection_date("08-01", 2025),
            NaiveDate::from_ymd_opt(2025, 8, 1)
        );
        assert_eq!(
            parse_projection_date("2019-08-01", 2025),
            NaiveDate::from_ymd_opt(2025, 8, 1)
        );
        assert!(parse_projection_date("August 1", 2025).is_none());
        assert!(parse_projection_date("", 2025).is_none());
    }

    #[test]
    fn coerce_bool_accepts_upstream_variants() {
        assert_eq!(coerce_bool("Y"), Some(true));
        assert_eq!(coerce_bool("1"), Some(true));
        assert_eq!(coerce_bool("true"), Some(true));
        assert_eq!(coerce_bool("no"), Some(false));
        assert_eq!(coerce_bool("0"), Some(false));
        assert_eq!(coerce_bool("maybe"), None);
    }
}
