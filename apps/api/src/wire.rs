use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use domain::CoreError;

/// Spec §6 "Times": accepts a full ISO-8601 instant (with offset) or a bare
/// `YYYY-MM-DDTHH:mm` local time, which is normalized to UTC using the
/// account's timezone.
pub fn parse_scheduled_at(raw: &str, tz: Tz) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            let local = match tz.from_local_datetime(&naive) {
                chrono::LocalResult::Single(dt) => dt,
                chrono::LocalResult::Ambiguous(dt, _) => dt,
                chrono::LocalResult::None => {
                    return Err(CoreError::Validation(format!(
                        "{raw} falls in a timezone transition gap in {tz}"
                    )))
                }
            };
            return Ok(local.with_timezone(&Utc));
        }
    }

    Err(CoreError::Validation(format!(
        "scheduled_at {raw} is neither RFC-3339 nor YYYY-MM-DDTHH:mm"
    )))
}

/// Parses an `HH:MM` time-of-day into minutes-since-midnight, the unit
/// `domain::planner::PlannerInput` uses for its randomization window.
pub fn parse_minute_of_day(raw: &str) -> Result<u32, CoreError> {
    let t = NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| CoreError::Validation(format!("expected HH:MM, got {raw}")))?;
    Ok((t.hour() * 60 + t.minute()) as u32)
}

/// `[start_date, end_date]` (inclusive, local calendar days in `tz`) as a
/// half-open UTC instant range, for bulk-querying existing posts that the
/// planner must treat as spacing anchors.
pub fn local_date_range_to_utc(
    start_date: chrono::NaiveDate,
    end_date: chrono::NaiveDate,
    tz: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_naive = start_date.and_hms_opt(0, 0, 0).unwrap();
    let end_naive = end_date
        .succ_opt()
        .unwrap_or(end_date)
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let start = match tz.from_local_datetime(&start_naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&start_naive),
    };
    let end = match tz.from_local_datetime(&end_naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(_, dt) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&end_naive),
    };
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_with_offset_is_used_as_is() {
        let dt = parse_scheduled_at("2025-06-01T10:00:00Z", chrono_tz::America::New_York).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-06-01T10:00:00+00:00");
    }

    #[test]
    fn bare_local_time_is_normalized_with_account_timezone() {
        let dt = parse_scheduled_at("2025-06-01T10:00", chrono_tz::America::New_York).unwrap();
        // EDT is UTC-4 in June.
        assert_eq!(dt.to_rfc3339(), "2025-06-01T14:00:00+00:00");
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(parse_scheduled_at("not-a-date", chrono_tz::UTC).is_err());
    }

    #[test]
    fn minute_of_day_parses_hh_mm() {
        assert_eq!(parse_minute_of_day("09:00").unwrap(), 540);
        assert_eq!(parse_minute_of_day("21:00").unwrap(), 1260);
        assert!(parse_minute_of_day("9am").is_err());
    }
}
