//! Planning horizon and labor calendar helpers.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::LaborDay;
use crate::error::{PlanError, PlanResult};

/// Inclusive range of calendar days the model plans over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Horizon {
    pub fn new(start: NaiveDate, end: NaiveDate) -> PlanResult<Self> {
        if end < start {
            return Err(PlanError::Config(format!(
                "horizon end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Zero-based day offset of `date` within the horizon.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if self.contains(date) {
            Some((date - self.start).num_days() as usize)
        } else {
            None
        }
    }

    pub fn date_at(&self, index: usize) -> NaiveDate {
        self.start + chrono::Duration::days(index as i64)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.num_days()).map(move |i| self.date_at(i))
    }
}

/// Labor regimes keyed by date, with defaulting rules for absent days.
///
/// Weekday dates inside the horizon must be present (checked by the
/// pre-build gate); absent weekend dates default to an idle day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaborCalendar {
    days: BTreeMap<NaiveDate, LaborDay>,
}

impl LaborCalendar {
    pub fn new(days: BTreeMap<NaiveDate, LaborDay>) -> Self {
        Self { days }
    }

    pub fn insert(&mut self, date: NaiveDate, day: LaborDay) {
        self.days.insert(date, day);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&LaborDay> {
        self.days.get(&date)
    }

    /// The regime in effect on `date`: the configured entry, or an idle day
    /// for absent weekend dates. Absent weekdays return `None` so the caller
    /// can refuse to guess.
    pub fn effective(&self, date: NaiveDate) -> Option<LaborDay> {
        match self.days.get(&date) {
            Some(day) => Some(*day),
            None if is_weekend(date) => Some(LaborDay::idle()),
            None => None,
        }
    }

    /// Weekday dates in `horizon` with no calendar entry.
    pub fn missing_weekdays(&self, horizon: &Horizon) -> Vec<NaiveDate> {
        horizon
            .days()
            .filter(|d| !is_weekend(*d) && !self.days.contains_key(d))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn horizon_day_indexing() {
        let h = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        assert_eq!(h.num_days(), 7);
        assert_eq!(h.index_of(d(2026, 3, 2)), Some(0));
        assert_eq!(h.index_of(d(2026, 3, 8)), Some(6));
        assert_eq!(h.index_of(d(2026, 3, 9)), None);
        assert_eq!(h.date_at(3), d(2026, 3, 5));
        assert_eq!(h.days().count(), 7);
    }

    #[test]
    fn inverted_horizon_rejected() {
        assert!(Horizon::new(d(2026, 3, 8), d(2026, 3, 2)).is_err());
    }

    #[test]
    fn weekend_defaults_to_idle_but_weekday_does_not() {
        let cal = LaborCalendar::default();
        // 2026-03-07 is a Saturday, 2026-03-09 a Monday
        let sat = cal.effective(d(2026, 3, 7)).unwrap();
        assert!(sat.is_idle());
        assert!(cal.effective(d(2026, 3, 9)).is_none());
    }

    #[test]
    fn missing_weekdays_reported() {
        let mut cal = LaborCalendar::default();
        let h = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        cal.insert(
            d(2026, 3, 2),
            LaborDay {
                fixed_hours: 12.0,
                regular_rate: 25.0,
                overtime_rate: 37.5,
                non_fixed_rate: 40.0,
                max_hours: 14.0,
            },
        );
        let missing = cal.missing_weekdays(&h);
        // Tue..Fri missing, Sat/Sun are fine without entries
        assert_eq!(missing.len(), 4);
        assert_eq!(missing[0], d(2026, 3, 3));
    }
}
