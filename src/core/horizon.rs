use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::quantity::energy::KilowattHours;

pub const QUARTERS_PER_DAY: usize = 96;
pub const QUARTERS_PER_HOUR: usize = 4;
pub const DAYS_PER_WEEK: usize = 7;
pub const MONTHS_PER_YEAR: usize = 12;

/// Today and tomorrow.
pub const MAX_HORIZON: usize = 2 * QUARTERS_PER_DAY;

/// Quarter-of-day index, `0` starts at midnight.
pub fn quarter_of_day(time: &impl Timelike) -> usize {
    (time.hour() as usize) * QUARTERS_PER_HOUR + (time.minute() as usize) / 15
}

/// Day-of-week index, `0` is Sunday.
pub fn day_of_week(date: &impl Datelike) -> usize {
    date.weekday().num_days_from_sunday() as usize
}

/// Month index, `0` is January.
pub fn month_of_year(date: &impl Datelike) -> usize {
    date.month0() as usize
}

/// Position of `now` within a horizon that starts at midnight of `first_day`.
///
/// Returns [`None`] when `now` is before the horizon.
pub fn horizon_index(first_day: NaiveDate, now: NaiveDateTime) -> Option<usize> {
    let n_days = usize::try_from((now.date() - first_day).num_days()).ok()?;
    Some(n_days * QUARTERS_PER_DAY + quarter_of_day(&now))
}

/// Single quarter of the planning horizon with its calendar coordinates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HorizonQuarter {
    /// Position within the price curve.
    pub index: usize,

    pub start: NaiveDateTime,
    pub quarter_of_day: usize,
    pub day_of_week: usize,
    pub month: usize,

    /// How many quarters ahead of the current one.
    pub distance: usize,
}

impl HorizonQuarter {
    pub fn new(first_day: NaiveDate, index: usize, current_index: usize) -> Self {
        let date = first_day + Days::new((index / QUARTERS_PER_DAY) as u64);
        let quarter_of_day = index % QUARTERS_PER_DAY;
        let start = date.and_time(NaiveTime::MIN) + TimeDelta::minutes(15 * quarter_of_day as i64);
        Self {
            index,
            start,
            quarter_of_day,
            day_of_week: day_of_week(&date),
            month: month_of_year(&date),
            distance: index.saturating_sub(current_index),
        }
    }
}

/// Per-quarter energy forecast consumed by the simulator.
pub trait EnergyForecast {
    fn consumption(&self, quarter: &HorizonQuarter) -> KilowattHours;

    fn production(&self, quarter: &HorizonQuarter) -> KilowattHours;
}

impl<T: EnergyForecast> EnergyForecast for &T {
    fn consumption(&self, quarter: &HorizonQuarter) -> KilowattHours {
        (*self).consumption(quarter)
    }

    fn production(&self, quarter: &HorizonQuarter) -> KilowattHours {
        (*self).production(quarter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_of_day_ok() {
        let time = NaiveTime::from_hms_opt(13, 47, 12).unwrap();
        assert_eq!(quarter_of_day(&time), 55);
        assert_eq!(quarter_of_day(&NaiveTime::MIN), 0);
    }

    #[test]
    fn day_of_week_starts_on_sunday() {
        // 2025-10-12 was a Sunday.
        assert_eq!(day_of_week(&NaiveDate::from_ymd_opt(2025, 10, 12).unwrap()), 0);
        assert_eq!(day_of_week(&NaiveDate::from_ymd_opt(2025, 10, 18).unwrap()), 6);
    }

    #[test]
    fn horizon_index_ok() {
        let first_day = NaiveDate::from_ymd_opt(2025, 10, 12).unwrap();
        let now = first_day.succ_opt().unwrap().and_hms_opt(0, 20, 0).unwrap();
        assert_eq!(horizon_index(first_day, now), Some(97));
        let before = first_day.pred_opt().unwrap().and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(horizon_index(first_day, before), None);
    }

    #[test]
    fn tomorrow_quarter() {
        let first_day = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let quarter = HorizonQuarter::new(first_day, 100, 90);
        assert_eq!(quarter.distance, 10);
        assert_eq!(quarter.quarter_of_day, 4);
        assert_eq!(quarter.month, 0);
        assert_eq!(quarter.start, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(1, 0, 0).unwrap());
    }
}
