use chrono::Weekday;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays an event applies to
///
/// An empty set means the event is not filtered by weekday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DaySet(u8);

impl DaySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn with(mut self, day: Weekday) -> Self {
        self.insert(day);
        self
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn intersects(&self, other: &DaySet) -> bool {
        self.0 & other.0 != 0
    }

    /// Days in the set, Monday first
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.iter().copied().filter(move |d| self.contains(*d))
    }

    /// Parse three-letter day codes
    ///
    /// Codes may be separated by commas or simply concatenated
    /// (`"MON,WED"`, `"monwed"`); anything else in the string is ignored.
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        WEEK.iter()
            .copied()
            .filter(|d| upper.contains(code(*d)))
            .collect()
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = DaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl FromStr for DaySet {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.iter().map(code).collect();
        f.write_str(&codes.join(","))
    }
}

fn code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_separated_and_concatenated() {
        let a = DaySet::parse("MON,WED");
        let b = DaySet::parse("wedmon");
        assert_eq!(a, b);
        assert!(a.contains(Weekday::Mon));
        assert!(!a.contains(Weekday::Tue));
        assert_eq!(a.to_string(), "MON,WED");
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(DaySet::parse("").is_empty());
        assert!(DaySet::parse("weekends").is_empty());
        assert_eq!(DaySet::empty().to_string(), "");
    }

    #[test]
    fn test_intersects() {
        let weekdays: DaySet = [Weekday::Mon, Weekday::Fri].into_iter().collect();
        let weekend = DaySet::empty().with(Weekday::Sat).with(Weekday::Sun);
        assert!(!weekdays.intersects(&weekend));
        assert!(weekdays.intersects(&DaySet::parse("FRI")));
    }
}
