//! Calendar event evaluation

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{trace, warn};

use crate::{CalendarError, CalendarResult, DaySet};

/// One active interval of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlot<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> TimeSlot<Tz> {
    pub fn duration(&self) -> Duration {
        self.end.clone() - self.start.clone()
    }
}

/// A single or repeating date/time span
///
/// `from` and `to` define the canonical first occurrence. When the event
/// repeats they also define the time-of-day window of every occurrence.
///
/// Recurrence:
/// - `interval == 0`: one span from `from` to `to`
/// - `interval > 0`: every N weeks when a day set is present, else every
///   N days, counted from the date of `from`
/// - `interval < 0`: monthly, on the day-of-month of `from`, or on its
///   week-of-month (1st, 2nd, ...) when a day set is present
///
/// A repeating event whose canonical occurrence lasts at most one day
/// repeats indefinitely; otherwise `to` also bounds the repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent<Tz: TimeZone = Local> {
    pub(crate) from: DateTime<Tz>,
    pub(crate) to: DateTime<Tz>,
    pub(crate) days: DaySet,
    pub(crate) interval: i32,
    pub(crate) exclusions: BTreeSet<NaiveDate>,
    pub(crate) all_day: bool,
}

impl<Tz: TimeZone> CalendarEvent<Tz> {
    /// Create a single span event
    pub fn new(from: DateTime<Tz>, to: DateTime<Tz>) -> CalendarResult<Self> {
        if to <= from {
            return Err(CalendarError::EmptySpan);
        }
        Ok(Self {
            from,
            to,
            days: DaySet::empty(),
            interval: 0,
            exclusions: BTreeSet::new(),
            all_day: false,
        })
    }

    /// Restrict the event to the given weekdays
    pub fn on_days(mut self, days: DaySet) -> Self {
        self.days = days;
        self
    }

    /// Set the repeat interval
    pub fn repeat_every(mut self, interval: i32) -> Self {
        self.interval = interval;
        self
    }

    /// Exclude a calendar date
    pub fn exclude(mut self, date: NaiveDate) -> Self {
        self.exclusions.insert(date);
        self
    }

    pub fn all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    pub fn from(&self) -> &DateTime<Tz> {
        &self.from
    }

    pub fn to(&self) -> &DateTime<Tz> {
        &self.to
    }

    pub fn days(&self) -> DaySet {
        self.days
    }

    pub fn interval(&self) -> i32 {
        self.interval
    }

    pub fn exclusions(&self) -> &BTreeSet<NaiveDate> {
        &self.exclusions
    }

    pub fn is_all_day(&self) -> bool {
        self.all_day
    }

    pub fn is_repeating(&self) -> bool {
        self.interval != 0
    }

    /// Generated human readable label
    pub fn label(&self) -> String
    where
        Tz::Offset: fmt::Display,
    {
        self.to_string()
    }

    /// Check whether the event is active at an instant
    pub fn is_active<T: TimeZone>(&self, when: &DateTime<T>) -> bool {
        let when = when.with_timezone(&self.from.timezone());
        if when < self.from {
            trace!("Before start of event");
            return false;
        }
        if self.span_end().is_some_and(|end| when > *end) {
            trace!("After end of event");
            return false;
        }

        // A window opened on the previous day may run past midnight
        let day = when.date_naive();
        let candidates = [day.pred_opt(), Some(day)];
        candidates.into_iter().flatten().any(|d| {
            self.is_day_relevant(d)
                && self
                    .day_window(d)
                    .is_some_and(|(start, end)| start <= when && when <= end)
        })
    }

    /// Compute the active intervals that fall within `[from, to)`
    ///
    /// Slots are ordered by day and clipped to the query range.
    pub fn get_slots(&self, from: &DateTime<Tz>, to: &DateTime<Tz>) -> Vec<TimeSlot<Tz>> {
        let mut slots = Vec::new();
        if *to < self.from || self.span_end().is_some_and(|end| *from > *end) {
            return slots;
        }

        let first = from.date_naive().pred_opt().unwrap_or(from.date_naive());
        let last = to.date_naive();
        let from_date = self.from.date_naive();
        let to_date = self.span_end().map(|end| end.date_naive());

        for day in first.iter_days().take_while(|d| *d <= last) {
            if day < from_date || to_date.is_some_and(|end| day > end) {
                continue;
            }
            if !self.is_day_relevant(day) {
                continue;
            }
            let Some((start, end)) = self.day_window(day) else {
                continue;
            };
            let start = if start < *from { from.clone() } else { start };
            let end = if end > *to { to.clone() } else { end };
            if end > start {
                slots.push(TimeSlot { start, end });
            }
        }
        slots
    }

    /// Conservative test for two events sharing an active instant
    ///
    /// Returns false only when the spans are disjoint or both events are
    /// restricted to disjoint weekdays. Repeat intervals and exclusions are
    /// not considered, so true means "possibly overlapping".
    pub fn can_overlap(&self, other: &CalendarEvent<Tz>) -> bool {
        if self.span_end().is_some_and(|end| *end < other.from) {
            return false;
        }
        if other.span_end().is_some_and(|end| *end < self.from) {
            return false;
        }
        if !self.days.is_empty() && !other.days.is_empty() && !self.days.intersects(&other.days) {
            return false;
        }
        true
    }

    /// End of the whole event, `None` when it repeats indefinitely
    fn span_end(&self) -> Option<&DateTime<Tz>> {
        if self.is_repeating() && self.to.clone() - self.from.clone() <= Duration::days(1) {
            None
        } else {
            Some(&self.to)
        }
    }

    fn uses_times(&self) -> bool {
        !self.days.is_empty() || self.interval != 0 || !self.exclusions.is_empty()
    }

    /// Weekday, interval and exclusion filters for one calendar date
    fn is_day_relevant(&self, day: NaiveDate) -> bool {
        if !self.days.is_empty() && !self.days.contains(day.weekday()) {
            return false;
        }

        let anchor = self.from.date_naive();
        if self.interval > 0 {
            let mut delta = (day - anchor).num_days();
            if !self.days.is_empty() {
                delta = delta.div_euclid(7);
            }
            if delta.rem_euclid(i64::from(self.interval)) != 0 {
                return false;
            }
        } else if self.interval < 0 {
            let matches = if self.days.is_empty() {
                day.day() == anchor.day()
            } else {
                week_of_month(day) == week_of_month(anchor)
            };
            if !matches {
                return false;
            }
        }

        !self.exclusions.contains(&day)
    }

    /// Active window on one relevant date, clipped to the event span
    fn day_window(&self, day: NaiveDate) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        let next = day.succ_opt()?;
        let uses_times = self.uses_times();

        let mut start = self.at(day, NaiveTime::MIN);
        let mut end = self.at(next, NaiveTime::MIN);

        if uses_times || day == self.from.date_naive() {
            start = self.at(day, self.from.time());
        }
        if uses_times || day == self.to.date_naive() {
            let to_at = self.at(day, self.to.time());
            end = if to_at <= start {
                self.at(next, self.to.time())
            } else {
                to_at
            };
        }

        if start < self.from {
            start = self.from.clone();
        }
        if let Some(span_end) = self.span_end() {
            if end > *span_end {
                end = span_end.clone();
            }
        }

        (end > start).then_some((start, end))
    }

    /// Resolve a wall clock time on a date, skipping forward over DST gaps
    pub(crate) fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
        let tz = self.from.timezone();
        let local = date.and_time(time);
        tz.from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
            .unwrap_or_else(|| tz.from_utc_datetime(&local))
    }
}

impl<Tz: TimeZone> CalendarEvent<Tz> {
    /// Repair a span that does not end after it starts
    pub(crate) fn normalize_span(&mut self) {
        if self.to <= self.from {
            warn!(from = ?self.from, to = ?self.to, "Calendar event ends before it starts");
            self.to = self.default_end();
        }
    }

    pub(crate) fn default_end(&self) -> DateTime<Tz> {
        if self.is_repeating() {
            self.from.clone() + Duration::days(7)
        } else {
            self.from.clone() + Duration::hours(1)
        }
    }
}

/// Row of the day in a month calendar whose weeks start on Sunday
///
/// The partial week holding the 1st is week 1.
fn week_of_month(day: NaiveDate) -> u32 {
    let first = day.with_day(1).unwrap_or(day);
    (day.day() + first.weekday().num_days_from_sunday() - 1) / 7 + 1
}

impl<Tz: TimeZone> fmt::Display for CalendarEvent<Tz>
where
    Tz::Offset: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DATE: &str = "%-m/%-d/%y";
        const DATE_TIME: &str = "%-m/%-d/%y %-I:%M %p";

        if self.all_day {
            write!(
                f,
                "{} - {} All Day",
                self.from.format(DATE),
                self.to.format(DATE)
            )?;
        } else {
            write!(
                f,
                "{} - {}",
                self.from.format(DATE_TIME),
                self.to.format(DATE_TIME)
            )?;
        }
        if !self.days.is_empty() {
            write!(f, " {}", self.days)?;
        }
        if self.interval != 0 {
            write!(f, " R{}", self.interval)?;
        }
        for date in &self.exclusions {
            write!(f, " -{}", date.format(DATE))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_span() {
        let e = CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 17, 0)).unwrap();
        assert!(e.is_active(&at(2024, 1, 1, 12, 0)));
        assert!(!e.is_active(&at(2024, 1, 1, 8, 59)));
        assert!(!e.is_active(&at(2024, 1, 1, 17, 1)));
        assert!(!e.is_active(&at(2024, 1, 2, 12, 0)));
    }

    #[test]
    fn test_multi_day_span_slots() {
        let e = CalendarEvent::new(at(2024, 1, 1, 22, 0), at(2024, 1, 3, 6, 0)).unwrap();
        let slots = e.get_slots(&at(2024, 1, 1, 0, 0), &at(2024, 1, 5, 0, 0));
        let pairs: Vec<_> = slots.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(
            pairs,
            vec![
                (at(2024, 1, 1, 22, 0), at(2024, 1, 2, 0, 0)),
                (at(2024, 1, 2, 0, 0), at(2024, 1, 3, 0, 0)),
                (at(2024, 1, 3, 0, 0), at(2024, 1, 3, 6, 0)),
            ]
        );
        assert!(e.is_active(&at(2024, 1, 2, 13, 0)));
    }

    #[test]
    fn test_daily_interval() {
        let e = CalendarEvent::new(at(2024, 1, 1, 7, 0), at(2024, 1, 1, 8, 0))
            .unwrap()
            .repeat_every(3);
        assert!(e.is_active(&at(2024, 1, 4, 7, 30)));
        assert!(!e.is_active(&at(2024, 1, 5, 7, 30)));
        assert!(!e.is_active(&at(2024, 1, 4, 8, 30)));
        assert!(e.is_active(&at(2024, 3, 1, 7, 30)));
    }

    #[test]
    fn test_cross_midnight_window() {
        let e = CalendarEvent::new(at(2024, 1, 5, 22, 0), at(2024, 1, 6, 2, 0))
            .unwrap()
            .on_days(DaySet::empty().with(Weekday::Fri))
            .repeat_every(1);
        assert!(e.is_active(&at(2024, 1, 12, 23, 0)));
        // Saturday morning belongs to Friday's window
        assert!(e.is_active(&at(2024, 1, 13, 1, 0)));
        assert!(!e.is_active(&at(2024, 1, 13, 3, 0)));
        assert!(!e.is_active(&at(2024, 1, 11, 23, 0)));

        let slots = e.get_slots(&at(2024, 1, 12, 0, 0), &at(2024, 1, 13, 12, 0));
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start, at(2024, 1, 12, 22, 0));
        assert_eq!(slots[0].end, at(2024, 1, 13, 2, 0));
        assert_eq!(slots[0].duration(), Duration::hours(4));
    }

    #[test]
    fn test_monthly_day_of_month() {
        let e = CalendarEvent::new(at(2024, 1, 15, 9, 0), at(2024, 1, 15, 10, 0))
            .unwrap()
            .repeat_every(-1);
        assert!(e.is_active(&at(2024, 2, 15, 9, 30)));
        assert!(!e.is_active(&at(2024, 2, 16, 9, 30)));
    }

    #[test]
    fn test_week_of_month_is_calendar_row() {
        // Jan 2024 starts on a Monday, Feb 2024 on a Thursday
        assert_eq!(week_of_month(date(2024, 1, 6)), 1);
        assert_eq!(week_of_month(date(2024, 1, 7)), 2);
        assert_eq!(week_of_month(date(2024, 2, 3)), 1);
        assert_eq!(week_of_month(date(2024, 2, 4)), 2);
        assert_eq!(week_of_month(date(2024, 9, 1)), 1);
    }

    #[test]
    fn test_monthly_week_of_month() {
        // Tuesday in the second calendar row
        let e = CalendarEvent::new(at(2024, 1, 9, 18, 0), at(2024, 1, 9, 20, 0))
            .unwrap()
            .on_days(DaySet::parse("TUE"))
            .repeat_every(-1);
        assert!(e.is_active(&at(2024, 2, 6, 19, 0)));
        assert!(!e.is_active(&at(2024, 2, 13, 19, 0)));
        assert!(!e.is_active(&at(2024, 2, 20, 19, 0)));
    }

    #[test]
    fn test_monthly_week_of_month_with_several_days() {
        // Anchored on Wed Jan 3, in the first row of January
        let e = CalendarEvent::new(at(2024, 1, 3, 9, 0), at(2024, 1, 3, 10, 0))
            .unwrap()
            .on_days(DaySet::parse("MON,WED"))
            .repeat_every(-1);
        assert!(e.is_active(&at(2024, 1, 3, 9, 30)));
        // Mon Feb 5 is in the second row of February
        assert!(!e.is_active(&at(2024, 2, 5, 9, 30)));
        assert!(!e.is_active(&at(2024, 2, 7, 9, 30)));
        // April 2024 starts on a Monday
        assert!(e.is_active(&at(2024, 4, 1, 9, 30)));
        assert!(e.is_active(&at(2024, 4, 3, 9, 30)));
        assert!(!e.is_active(&at(2024, 4, 8, 9, 30)));
    }

    #[test]
    fn test_label_matches_display() {
        let e = CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 17, 0)).unwrap();
        assert_eq!(e.label(), e.to_string());
    }

    #[test]
    fn test_exclusions_clip_slots() {
        let e = CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 10, 0))
            .unwrap()
            .repeat_every(1)
            .exclude(date(2024, 1, 2));
        let slots = e.get_slots(&at(2024, 1, 1, 0, 0), &at(2024, 1, 3, 23, 0));
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(2024, 1, 1, 9, 0), at(2024, 1, 3, 9, 0)]);
    }

    #[test]
    fn test_slots_clipped_to_query() {
        let e = CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 17, 0)).unwrap();
        let slots = e.get_slots(&at(2024, 1, 1, 12, 0), &at(2024, 1, 1, 13, 0));
        assert_eq!(
            slots,
            vec![TimeSlot {
                start: at(2024, 1, 1, 12, 0),
                end: at(2024, 1, 1, 13, 0)
            }]
        );
        assert!(e
            .get_slots(&at(2024, 1, 2, 0, 0), &at(2024, 1, 3, 0, 0))
            .is_empty());
    }

    #[test]
    fn test_can_overlap() {
        let morning = CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 10, 0)).unwrap();
        let evening = CalendarEvent::new(at(2024, 1, 1, 18, 0), at(2024, 1, 1, 19, 0)).unwrap();
        assert!(!morning.can_overlap(&evening));
        assert!(!evening.can_overlap(&morning));

        let mondays = morning.clone().on_days(DaySet::parse("MON")).repeat_every(1);
        let tuesdays = CalendarEvent::new(at(2024, 1, 2, 9, 0), at(2024, 1, 2, 10, 0))
            .unwrap()
            .on_days(DaySet::parse("TUE"))
            .repeat_every(1);
        assert!(!mondays.can_overlap(&tuesdays));

        let weekdays = tuesdays.clone().on_days(DaySet::parse("MON,TUE,WED,THU,FRI"));
        assert!(mondays.can_overlap(&weekdays));
    }

    #[test]
    fn test_label() {
        let e = CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 17, 0))
            .unwrap()
            .on_days(DaySet::parse("MON"))
            .repeat_every(1);
        assert_eq!(e.label(), "1/1/24 9:00 AM - 1/1/24 5:00 PM MON R1");

        let day = CalendarEvent::new(at(2024, 1, 1, 0, 0), at(2024, 1, 2, 0, 0))
            .unwrap()
            .all_day(true);
        assert_eq!(day.to_string(), "1/1/24 - 1/2/24 All Day");
    }

    #[test]
    fn test_rejects_empty_span() {
        assert_eq!(
            CalendarEvent::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 9, 0)),
            Err(CalendarError::EmptySpan)
        );
    }
}
