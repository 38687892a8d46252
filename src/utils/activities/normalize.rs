use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

use super::errors::{
    ActivityError, FieldError, MSG_DATE_REQUIRED, MSG_INVALID_CAPACITY, MSG_INVALID_CATEGORY,
    MSG_INVALID_COST, MSG_INVALID_DATE, MSG_INVALID_KIND, MSG_INVALID_TIME,
};
use super::models::{
    parse_utc_offset, ActivityKind, ActivitySubmission, Category, RawActivityPayload, RawId,
    RawNumber, FALLBACK_TIMEZONE,
};

/// Produces the canonical submission from a raw client payload. Pure; all
/// malformed fields are collected into one validation report rather than
/// failing on the first.
pub fn normalize_submission(
    trip_id: i32,
    raw: RawActivityPayload,
    default_kind: ActivityKind,
    trip_timezone: Option<&str>,
    user_timezone: Option<&str>,
) -> Result<ActivitySubmission, ActivityError> {
    let timezone = resolve_timezone(trip_timezone, user_timezone);
    let offset = parse_utc_offset(&timezone).unwrap_or(UtcOffset::UTC);
    let mut errors: Vec<FieldError> = Vec::new();

    let name = raw.name.as_deref().unwrap_or("").trim().to_string();
    let description = nonempty(raw.description);
    let location = nonempty(raw.location);

    let start_date = match raw.start_date.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push(FieldError::new("start_date", MSG_DATE_REQUIRED));
            None
        }
        Some(s) => match parse_submission_date(s, offset) {
            Some(date) => Some(date),
            None => {
                errors.push(FieldError::new("start_date", MSG_INVALID_DATE));
                None
            }
        },
    };

    let start_time = parse_optional_time(raw.start_time.as_deref(), offset, "start_time", &mut errors);
    let end_time = parse_optional_time(raw.end_time.as_deref(), offset, "end_time", &mut errors);

    let cost = match raw.cost {
        None => None,
        Some(value) => match parse_cost(value) {
            Ok(cost) => cost,
            Err(()) => {
                errors.push(FieldError::new("cost", MSG_INVALID_COST));
                None
            }
        },
    };

    let max_capacity = match raw.max_capacity {
        None => None,
        Some(value) => match parse_capacity(value) {
            Ok(capacity) => capacity,
            Err(()) => {
                errors.push(FieldError::new("max_capacity", MSG_INVALID_CAPACITY));
                None
            }
        },
    };

    let category = match raw.category.as_deref().map(str::trim) {
        None | Some("") => Category::Other,
        Some(s) => match Category::from_str(s) {
            Ok(category) => category,
            Err(()) => {
                errors.push(FieldError::new("category", MSG_INVALID_CATEGORY));
                Category::Other
            }
        },
    };

    let kind = match raw.kind.as_deref().map(str::trim) {
        None | Some("") => default_kind,
        Some(s) => match ActivityKind::from_str(s) {
            Ok(kind) => kind,
            Err(()) => {
                errors.push(FieldError::new("type", MSG_INVALID_KIND));
                default_kind
            }
        },
    };

    let attendee_ids = dedupe_attendees(raw.attendee_ids.unwrap_or_default());

    let idempotency_key = raw
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        // Without a client key each retry is a fresh submission; dedup is a no-op.
        .unwrap_or_else(|| nanoid::nanoid!());

    if !errors.is_empty() {
        return Err(ActivityError::validation(errors));
    }

    Ok(ActivitySubmission {
        trip_id,
        name,
        description,
        // Unreachable fallback: a missing date was recorded above.
        start_date: start_date.unwrap_or(Date::MIN),
        start_time,
        end_time,
        location,
        cost,
        max_capacity,
        category,
        attendee_ids,
        kind,
        timezone,
        idempotency_key,
    })
}

/// Trip timezone wins, then the submitting user's, then the server's local
/// offset, then UTC. Only fixed-offset designators are honored.
pub fn resolve_timezone(trip_timezone: Option<&str>, user_timezone: Option<&str>) -> String {
    for candidate in [trip_timezone, user_timezone].into_iter().flatten() {
        if parse_utc_offset(candidate).is_some() {
            return canonical_timezone(candidate);
        }
    }
    match UtcOffset::current_local_offset() {
        Ok(offset) if offset == UtcOffset::UTC => FALLBACK_TIMEZONE.to_string(),
        Ok(offset) => {
            let (h, m, _) = offset.as_hms();
            format!("{}{:02}:{:02}", if h < 0 || m < 0 { "-" } else { "+" }, h.abs(), m.abs())
        }
        Err(_) => FALLBACK_TIMEZONE.to_string(),
    }
}

fn canonical_timezone(tz: &str) -> String {
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        FALLBACK_TIMEZONE.to_string()
    } else {
        tz.to_string()
    }
}

/// A bare `YYYY-MM-DD` is a calendar date and never goes through a datetime
/// parser that could shift it across a timezone boundary. Anything else must
/// be a full RFC 3339 instant, reduced to its date in the resolved offset.
fn parse_submission_date(s: &str, offset: UtcOffset) -> Option<Date> {
    if let Some((year, month, day)) = split_calendar_date(s) {
        let month = Month::try_from(month).ok()?;
        return Date::from_calendar_date(year, month, day).ok();
    }
    OffsetDateTime::parse(s, &Rfc3339)
        .ok()
        .map(|instant| instant.to_offset(offset).date())
}

fn split_calendar_date(s: &str) -> Option<(i32, u8, u8)> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let year = s[..4].parse().ok()?;
    let month = s[5..7].parse().ok()?;
    let day = s[8..10].parse().ok()?;
    Some((year, month, day))
}

/// Strict 24-hour `HH:MM`; a full instant is reduced to its wall-clock time in
/// the resolved offset.
fn parse_submission_time(s: &str, offset: UtcOffset) -> Option<Time> {
    let bytes = s.as_bytes();
    if bytes.len() == 5 && bytes[2] == b':' {
        let hour: u8 = s[..2].parse().ok()?;
        let minute: u8 = s[3..5].parse().ok()?;
        return Time::from_hms(hour, minute, 0).ok();
    }
    OffsetDateTime::parse(s, &Rfc3339)
        .ok()
        .map(|instant| instant.to_offset(offset).time())
        .map(|time| time.replace_second(0).expect("zero is a valid second"))
        .map(|time| time.replace_nanosecond(0).expect("zero is a valid nanosecond"))
}

fn parse_optional_time(
    raw: Option<&str>,
    offset: UtcOffset,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Time> {
    match raw.map(str::trim) {
        None | Some("") => None,
        Some(s) => match parse_submission_time(s, offset) {
            Some(time) => Some(time),
            None => {
                errors.push(FieldError::new(field, MSG_INVALID_TIME));
                None
            }
        },
    }
}

fn parse_cost(value: RawNumber) -> Result<Option<Decimal>, ()> {
    match value {
        RawNumber::Num(n) => Decimal::try_from(n).map(Some).map_err(|_| ()),
        RawNumber::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                Decimal::from_str(s).map(Some).map_err(|_| ())
            }
        }
    }
}

fn parse_capacity(value: RawNumber) -> Result<Option<i32>, ()> {
    match value {
        RawNumber::Num(n) => {
            if n.fract() != 0.0 || n < i32::MIN as f64 || n > i32::MAX as f64 {
                Err(())
            } else {
                Ok(Some(n as i32))
            }
        }
        RawNumber::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<i32>().map(Some).map_err(|_| ())
            }
        }
    }
}

fn dedupe_attendees(raw: Vec<RawId>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for id in raw {
        let id = id.into_string();
        if !id.is_empty() && seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    ids
}

fn nonempty(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod normalize_tests {
    use time::macros::{date, time};

    use super::*;

    fn raw_scheduled() -> RawActivityPayload {
        RawActivityPayload {
            name: Some("Sunset Cruise".to_string()),
            start_date: Some("2025-07-04".to_string()),
            start_time: Some("18:00".to_string()),
            end_time: Some("20:00".to_string()),
            category: Some("entertainment".to_string()),
            attendee_ids: Some(vec![
                RawId::Text("abc".to_string()),
                RawId::Text("def".to_string()),
            ]),
            kind: Some("SCHEDULED".to_string()),
            idempotency_key: Some("key-1".to_string()),
            ..Default::default()
        }
    }

    fn normalize(raw: RawActivityPayload) -> Result<ActivitySubmission, ActivityError> {
        normalize_submission(1, raw, ActivityKind::Scheduled, Some("UTC"), None)
    }

    fn report(err: ActivityError) -> super::super::errors::ValidationReport {
        match err {
            ActivityError::Validation(report) => report,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn bare_date_parses_as_calendar_date() {
        let sub = normalize(raw_scheduled()).unwrap();
        assert_eq!(sub.start_date, date!(2025 - 07 - 04));
        assert_eq!(sub.start_time, Some(time!(18:00)));
        assert_eq!(sub.end_time, Some(time!(20:00)));
    }

    #[test]
    fn rfc3339_date_reduces_in_resolved_offset() {
        let mut raw = raw_scheduled();
        raw.start_date = Some("2025-07-04T23:30:00-02:00".to_string());
        // 23:30 at -02:00 is already 01:30 next day in UTC
        let sub = normalize(raw).unwrap();
        assert_eq!(sub.start_date, date!(2025 - 07 - 05));
    }

    #[test]
    fn impossible_calendar_date_is_rejected() {
        let mut raw = raw_scheduled();
        raw.start_date = Some("2025-13-40".to_string());
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.field_message("start_date"), Some(MSG_INVALID_DATE));
    }

    #[test]
    fn single_digit_hour_is_rejected() {
        let mut raw = raw_scheduled();
        raw.start_time = Some("7:00".to_string());
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.field_message("start_time"), Some(MSG_INVALID_TIME));
    }

    #[test]
    fn out_of_range_time_is_rejected() {
        let mut raw = raw_scheduled();
        raw.end_time = Some("25:61".to_string());
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.field_message("end_time"), Some(MSG_INVALID_TIME));
    }

    #[test]
    fn empty_cost_string_normalizes_to_none() {
        let mut raw = raw_scheduled();
        raw.cost = Some(RawNumber::Text("  ".to_string()));
        assert_eq!(normalize(raw).unwrap().cost, None);
    }

    #[test]
    fn cost_string_parses_as_decimal() {
        let mut raw = raw_scheduled();
        raw.cost = Some(RawNumber::Text("12.50".to_string()));
        assert_eq!(
            normalize(raw).unwrap().cost,
            Some(Decimal::from_str("12.50").unwrap())
        );
    }

    #[test]
    fn non_numeric_cost_is_a_field_error_not_zero() {
        let mut raw = raw_scheduled();
        raw.cost = Some(RawNumber::Text("free".to_string()));
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.field_message("cost"), Some(MSG_INVALID_COST));
    }

    #[test]
    fn attendee_ids_are_stringified_and_deduplicated() {
        let mut raw = raw_scheduled();
        raw.attendee_ids = Some(vec![
            RawId::Num(42),
            RawId::Text("abc".to_string()),
            RawId::Text("42".to_string()),
            RawId::Text("abc".to_string()),
        ]);
        let sub = normalize(raw).unwrap();
        assert_eq!(sub.attendee_ids, vec!["42", "abc"]);
    }

    #[test]
    fn category_is_case_folded() {
        let mut raw = raw_scheduled();
        raw.category = Some("FOOD".to_string());
        assert_eq!(normalize(raw).unwrap().category, Category::Food);
    }

    #[test]
    fn unknown_category_fails_instead_of_falling_back() {
        let mut raw = raw_scheduled();
        raw.category = Some("extreme-ironing".to_string());
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.field_message("category"), Some(MSG_INVALID_CATEGORY));
    }

    #[test]
    fn v2_field_names_map_to_the_same_record() {
        let raw: RawActivityPayload = serde_json::from_value(serde_json::json!({
            "title": "Sunset Cruise",
            "start_date": "2025-07-04",
            "start_time": "18:00",
            "end_time": "20:00",
            "category": "entertainment",
            "invitee_ids": ["abc", "def"],
            "mode": "SCHEDULED",
            "idempotency_key": "key-1",
        }))
        .unwrap();
        let legacy: RawActivityPayload = serde_json::from_value(serde_json::json!({
            "name": "Sunset Cruise",
            "date": "2025-07-04",
            "startTime": "18:00",
            "endTime": "20:00",
            "category": "entertainment",
            "attendeeIds": ["abc", "def"],
            "type": "SCHEDULED",
            "idempotencyKey": "key-1",
        }))
        .unwrap();
        assert_eq!(normalize(raw).unwrap(), normalize(legacy).unwrap());
    }

    #[test]
    fn missing_date_is_reported_on_start_date() {
        let mut raw = raw_scheduled();
        raw.start_date = None;
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.field_message("start_date"), Some(MSG_DATE_REQUIRED));
    }

    #[test]
    fn multiple_bad_fields_are_collected_together() {
        let mut raw = raw_scheduled();
        raw.start_time = Some("6pm".to_string());
        raw.category = Some("nope".to_string());
        raw.cost = Some(RawNumber::Text("free".to_string()));
        let report = report(normalize(raw).unwrap_err());
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        let first = normalize(raw_scheduled()).unwrap();
        let serialized = serde_json::to_value(&first).unwrap();
        let reparsed: RawActivityPayload = serde_json::from_value(serialized).unwrap();
        let second = normalize(reparsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trip_timezone_wins_over_user_timezone() {
        assert_eq!(resolve_timezone(Some("+02:00"), Some("-05:00")), "+02:00");
        assert_eq!(resolve_timezone(None, Some("-05:00")), "-05:00");
        assert_eq!(resolve_timezone(Some("utc"), None), "UTC");
    }
}
