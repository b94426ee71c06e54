//! Persisted field form of calendar events
//!
//! | field          | form                                      | default           |
//! |----------------|-------------------------------------------|-------------------|
//! | `FROMDATETIME` | epoch milliseconds                        | now               |
//! | `TODATETIME`   | epoch milliseconds                        | see below         |
//! | `DAYS`         | three-letter codes, comma separated       | no day filter     |
//! | `INTERVAL`     | integer                                   | 0                 |
//! | `ALLDAY`       | boolean                                   | false             |
//! | `EXCLUDE`      | list of epoch milliseconds, any time of day | none            |
//!
//! A missing `TODATETIME` becomes `FROMDATETIME` plus seven days for a
//! repeating event and plus one hour otherwise.

use casa_core::{Fields, Value};
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::{CalendarError, CalendarEvent, CalendarResult, DaySet};

const FROM: &str = "FROMDATETIME";
const TO: &str = "TODATETIME";
const DAYS: &str = "DAYS";
const INTERVAL: &str = "INTERVAL";
const ALL_DAY: &str = "ALLDAY";
const EXCLUDE: &str = "EXCLUDE";

impl CalendarEvent<Local> {
    /// Parse persisted fields in the local time zone
    pub fn from_fields(fields: &Fields) -> CalendarResult<Self> {
        Self::from_fields_in(fields, Local)
    }
}

impl<Tz: TimeZone> CalendarEvent<Tz> {
    /// Parse persisted fields, interpreting dates in `tz`
    pub fn from_fields_in(fields: &Fields, tz: Tz) -> CalendarResult<Self> {
        let from = match millis(fields, FROM)? {
            Some(ms) => timestamp(&tz, FROM, ms)?,
            None => Utc::now().with_timezone(&tz),
        };

        let interval = match fields.get(INTERVAL) {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| invalid(INTERVAL, v))?,
        };

        let days = match fields.get(DAYS) {
            None | Some(Value::Null) => DaySet::empty(),
            Some(Value::String(s)) => DaySet::parse(s),
            Some(v) => return Err(invalid(DAYS, v)),
        };

        let all_day = match fields.get(ALL_DAY) {
            None | Some(Value::Null) => false,
            Some(v) => v.as_bool().ok_or_else(|| invalid(ALL_DAY, v))?,
        };

        let mut exclusions = BTreeSet::new();
        match fields.get(EXCLUDE) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let ms = item.as_i64().ok_or_else(|| invalid(EXCLUDE, item))?;
                    exclusions.insert(timestamp(&tz, EXCLUDE, ms)?.date_naive());
                }
            }
            Some(v) => return Err(invalid(EXCLUDE, v)),
        }

        let to = millis(fields, TO)?
            .map(|ms| timestamp(&tz, TO, ms))
            .transpose()?;

        let mut event = CalendarEvent {
            to: from.clone(),
            from,
            days,
            interval,
            exclusions,
            all_day,
        };
        match to {
            Some(to) => {
                event.to = to;
                event.normalize_span();
            }
            None => {
                debug!("Calendar event has no end, using default");
                event.to = event.default_end();
            }
        }
        Ok(event)
    }

    /// Render the persisted field form
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FROM.into(), Value::from(self.from.timestamp_millis()));
        fields.insert(TO.into(), Value::from(self.to.timestamp_millis()));
        if !self.days.is_empty() {
            fields.insert(DAYS.into(), Value::from(self.days.to_string()));
        }
        fields.insert(INTERVAL.into(), Value::from(self.interval));
        fields.insert(ALL_DAY.into(), Value::from(self.all_day));
        if !self.exclusions.is_empty() {
            let dates: Vec<Value> = self
                .exclusions
                .iter()
                .map(|d| Value::from(self.at(*d, NaiveTime::MIN).timestamp_millis()))
                .collect();
            fields.insert(EXCLUDE.into(), Value::Array(dates));
        }
        fields
    }
}

fn millis(fields: &Fields, field: &'static str) -> CalendarResult<Option<i64>> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| invalid(field, v)),
    }
}

fn timestamp<Tz: TimeZone>(tz: &Tz, field: &'static str, ms: i64) -> CalendarResult<DateTime<Tz>> {
    tz.timestamp_millis_opt(ms)
        .single()
        .ok_or(CalendarError::InvalidTimestamp { field, millis: ms })
}

fn invalid(field: &'static str, value: &Value) -> CalendarError {
    CalendarError::InvalidField {
        field,
        reason: format!("unexpected value {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, NaiveDate};
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_round_trip_is_stable() {
        let input = fields(json!({
            "FROMDATETIME": 1_704_099_600_000i64,
            "TODATETIME": 1_704_103_200_000i64,
            "DAYS": "wedmon",
            "INTERVAL": 2,
            "ALLDAY": false,
            "EXCLUDE": [1_704_798_000_000i64]
        }));
        let event = CalendarEvent::from_fields_in(&input, Utc).unwrap();
        let first = event.to_fields();
        assert_eq!(first["DAYS"], "MON,WED");
        assert_eq!(first["EXCLUDE"], json!([1_704_758_400_000i64]));

        let again = CalendarEvent::from_fields_in(&first, Utc).unwrap().to_fields();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&again).unwrap()
        );
    }

    #[test]
    fn test_missing_end_defaults() {
        let single = CalendarEvent::from_fields_in(
            &fields(json!({"FROMDATETIME": 1_704_099_600_000i64})),
            Utc,
        )
        .unwrap();
        assert_eq!(single.to().clone() - single.from().clone(), Duration::hours(1));

        let weekly = CalendarEvent::from_fields_in(
            &fields(json!({"FROMDATETIME": 1_704_099_600_000i64, "INTERVAL": 1})),
            Utc,
        )
        .unwrap();
        assert_eq!(weekly.to().clone() - weekly.from().clone(), Duration::days(7));
    }

    #[test]
    fn test_end_before_start_is_repaired() {
        let event = CalendarEvent::from_fields_in(
            &fields(json!({
                "FROMDATETIME": 1_704_099_600_000i64,
                "TODATETIME": 1_704_000_000_000i64
            })),
            Utc,
        )
        .unwrap();
        assert!(event.to() > event.from());
    }

    #[test]
    fn test_exclusions_use_event_time_zone() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        // 2024-01-10 02:00 UTC is still January 9th five hours west
        let event = CalendarEvent::from_fields_in(
            &fields(json!({
                "FROMDATETIME": 1_704_099_600_000i64,
                "EXCLUDE": [1_704_852_000_000i64]
            })),
            tz,
        )
        .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert!(event.exclusions().contains(&expected));
    }

    #[test]
    fn test_invalid_fields() {
        let err = CalendarEvent::from_fields_in(&fields(json!({"INTERVAL": "weekly"})), Utc);
        assert!(matches!(
            err,
            Err(CalendarError::InvalidField { field: "INTERVAL", .. })
        ));

        let err = CalendarEvent::from_fields_in(&fields(json!({"EXCLUDE": "2024-01-01"})), Utc);
        assert!(matches!(
            err,
            Err(CalendarError::InvalidField { field: "EXCLUDE", .. })
        ));
    }
}
