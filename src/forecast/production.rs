use std::f64::consts::FRAC_PI_2;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{
    core::horizon::{MONTHS_PER_YEAR, QUARTERS_PER_DAY, QUARTERS_PER_HOUR, month_of_year, quarter_of_day},
    forecast::{
        accumulator::{FinishedQuarter, QuarterAccumulator},
        correction::Correction,
    },
    prelude::*,
    quantity::{Zero, energy::{KilowattHours, WattHours}, power::Watts, time::Hours},
};

const ALPHA: f64 = 0.2;
const CORRECTION_ALPHA: f64 = 0.3;

/// Quarters 08:00 through 16:00, where the correction is learned.
const CORRECTION_QUARTERS: std::ops::RangeInclusive<usize> = 32..=64;

/// Quarters 06:00 through 20:00, checked for reliable data.
const DAYLIGHT_QUARTERS: std::ops::Range<usize> = 24..80;
const MIN_RELIABLE_QUARTERS: usize = 40;

const MAX_PREDICTION_FACTOR: f64 = 3.0;

/// Share of the installed power reachable at the peak.
const PEAK_EFFICIENCY: f64 = 0.8;

/// Relative production of each month, July is the best one.
const SEASONAL_FACTORS: [f64; MONTHS_PER_YEAR] =
    [0.15, 0.25, 0.45, 0.65, 0.85, 0.95, 1.00, 0.90, 0.65, 0.40, 0.20, 0.12];

/// Sunrise, peak and sunset hours.
#[derive(Copy, Clone, Debug)]
struct SolarDay {
    sunrise: f64,
    peak: f64,
    sunset: f64,
}

impl SolarDay {
    const SUMMER: Self = Self { sunrise: 5.0, peak: 13.0, sunset: 21.0 };
    const SPRING_AUTUMN: Self = Self { sunrise: 6.5, peak: 12.5, sunset: 18.5 };
    const WINTER: Self = Self { sunrise: 7.5, peak: 12.0, sunset: 16.5 };

    const fn of_month(month: usize) -> Self {
        match month {
            4..=7 => Self::SUMMER,
            2..=9 => Self::SPRING_AUTUMN,
            _ => Self::WINTER,
        }
    }

    /// Sine-shaped production share in `0.0..=1.0`, reaching `1.0` at the peak.
    fn shape(&self, hour: f64) -> f64 {
        if hour <= self.sunrise || hour >= self.sunset {
            0.0
        } else if hour <= self.peak {
            (FRAC_PI_2 * (hour - self.sunrise) / (self.peak - self.sunrise)).sin()
        } else {
            (FRAC_PI_2 * (self.sunset - hour) / (self.sunset - self.peak)).sin()
        }
    }
}

/// Expected production of the quarter in the month, when nothing has been learned yet.
pub fn default_production(installed_power: Watts, month: usize, quarter: usize) -> WattHours {
    #[expect(clippy::cast_precision_loss)]
    let hour = quarter as f64 / QUARTERS_PER_HOUR as f64;
    SEASONAL_FACTORS.get(month).map_or(WattHours::ZERO, |seasonal_factor| {
        installed_power * Hours::QUARTER
            * (PEAK_EFFICIENCY * seasonal_factor * SolarDay::of_month(month).shape(hour))
    })
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionCell {
    pub energy: WattHours,
    pub n_samples: u32,
}

/// Per-month, per-quarter moving average of the production.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionHistory {
    #[serde_as(as = "[[_; 96]; 12]")]
    months: [[ProductionCell; QUARTERS_PER_DAY]; MONTHS_PER_YEAR],
}

impl Default for ProductionHistory {
    fn default() -> Self {
        Self { months: [[ProductionCell::default(); QUARTERS_PER_DAY]; MONTHS_PER_YEAR] }
    }
}

impl ProductionHistory {
    /// Cell of the month, `None` for the indices outside the grid.
    #[must_use]
    pub fn cell(&self, month: usize, quarter: usize) -> Option<&ProductionCell> {
        self.months.get(month)?.get(quarter)
    }

    fn record(&mut self, month: usize, quarter: usize, energy: WattHours) {
        let cell = &mut self.months[month][quarter];
        cell.energy = if cell.n_samples == 0 { energy } else { energy * ALPHA + cell.energy * (1.0 - ALPHA) };
        cell.n_samples = cell.n_samples.saturating_add(1);
    }
}

/// Learns the solar production per month and quarter-of-day.
#[derive(Clone, Debug)]
pub struct ProductionPredictor {
    history: ProductionHistory,
    installed_power: Watts,
    accumulator: QuarterAccumulator,
    correction: Correction,
}

impl ProductionPredictor {
    pub const fn new(history: ProductionHistory, installed_power: Watts) -> Self {
        Self {
            history,
            installed_power,
            accumulator: QuarterAccumulator::new(),
            correction: Correction::new(CORRECTION_ALPHA),
        }
    }

    #[must_use]
    pub const fn history(&self) -> &ProductionHistory {
        &self.history
    }

    pub const fn installed_power(&self) -> Watts {
        self.installed_power
    }

    pub const fn set_installed_power(&mut self, installed_power: Watts) {
        self.installed_power = installed_power;
    }

    /// Feed the PV power sample.
    ///
    /// Returns `true` when the sample finished a quarter, and the quarter has been committed.
    pub fn add_sample(&mut self, power: Watts, timestamp: NaiveDateTime) -> bool {
        if !power.is_finite() {
            warn!(?power, %timestamp, "ignoring non-finite PV power");
            return false;
        }
        let finished = self.accumulator.push(power.max(Watts::ZERO), timestamp);
        if let Some(finished) = finished {
            self.commit(finished);
        }
        finished.is_some()
    }

    fn commit(&mut self, finished: FinishedQuarter) {
        let month = month_of_year(&finished.date);
        let quarter = finished.quarter_of_day;
        let energy = finished.mean_power * Hours::QUARTER;

        self.correction.roll_over(finished.date);
        if CORRECTION_QUARTERS.contains(&quarter) {
            let base = self.base_prediction(month, quarter);
            self.correction.update(energy - base);
        }
        self.history.record(month, quarter, energy);

        debug!(
            date = %finished.date,
            month,
            quarter,
            %energy,
            average = ?self.history.cell(month, quarter).map(|cell| cell.energy),
            correction = %self.correction.error(),
            "committed production",
        );
    }

    /// Learned average, or the default curve when the cell has no samples.
    pub fn base_prediction(&self, month: usize, quarter: usize) -> WattHours {
        match self.history.cell(month, quarter) {
            Some(cell) if cell.n_samples != 0 => cell.energy,
            _ => default_production(self.installed_power, month, quarter),
        }
    }

    /// Base prediction plus the flat correction.
    pub fn predict(&self, month: usize, quarter: usize) -> WattHours {
        let base = self.base_prediction(month, quarter);
        (base + self.correction.error()).clamp(WattHours::ZERO, base * MAX_PREDICTION_FACTOR)
    }

    pub fn predict_hourly(&self, month: usize, hour: usize) -> WattHours {
        (hour * QUARTERS_PER_HOUR..(hour + 1) * QUARTERS_PER_HOUR)
            .map(|quarter| self.predict(month, quarter))
            .sum()
    }

    /// Production from the current quarter till midnight.
    pub fn predict_remaining_day(&self, now: NaiveDateTime) -> KilowattHours {
        let month = month_of_year(&now);
        (quarter_of_day(&now)..QUARTERS_PER_DAY)
            .map(|quarter| self.predict(month, quarter))
            .sum::<WattHours>()
            .into()
    }

    /// Whole-day production without the correction.
    pub fn expected_daily_production(&self, month: usize) -> KilowattHours {
        (0..QUARTERS_PER_DAY)
            .map(|quarter| self.base_prediction(month, quarter))
            .sum::<WattHours>()
            .into()
    }

    /// Enough of the daylight quarters of the month have been observed.
    #[must_use]
    pub fn has_reliable_data(&self, month: usize) -> bool {
        DAYLIGHT_QUARTERS
            .filter(|quarter| self.history.cell(month, *quarter).is_some_and(|cell| cell.n_samples != 0))
            .count()
            >= MIN_RELIABLE_QUARTERS
    }

    pub const fn correction(&self) -> WattHours {
        self.correction.error()
    }

    pub fn reset_correction(&mut self) {
        self.correction.reset();
    }

    /// Forget everything learned, keep the installed power.
    pub fn clear(&mut self) {
        info!("clearing the production history");
        *self = Self::new(ProductionHistory::default(), self.installed_power);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{NaiveDate, TimeDelta};

    use super::*;

    const OCTOBER: usize = 9;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn predictor() -> ProductionPredictor {
        ProductionPredictor::new(ProductionHistory::default(), Watts(10_000.0))
    }

    #[test]
    fn default_curve() {
        let predictor = predictor();
        assert_eq!(predictor.predict(OCTOBER, 0), WattHours::ZERO);
        assert_eq!(predictor.predict(OCTOBER, 26), WattHours::ZERO);
        assert_eq!(predictor.predict(OCTOBER, 75), WattHours::ZERO);
        // 10 kWp × 0.25 h × 0.8 × 0.40 at the 12:30 peak:
        assert_abs_diff_eq!(predictor.predict(OCTOBER, 50).0, 800.0, epsilon = 1e-9);
        assert!(predictor.predict(OCTOBER, 40) < predictor.predict(OCTOBER, 50));
        assert!(predictor.expected_daily_production(6) > predictor.expected_daily_production(11));
    }

    #[test]
    fn default_curve_is_symmetric_around_peak() {
        let before = default_production(Watts(10_000.0), OCTOBER, 46);
        let after = default_production(Watts(10_000.0), OCTOBER, 54);
        assert_abs_diff_eq!(before.0, after.0, epsilon = 1e-9);
    }

    #[test]
    fn moving_average() {
        let mut predictor = predictor();
        predictor.add_sample(Watts(400.0), at(18, 0));
        assert!(predictor.add_sample(Watts(0.0), at(18, 15)));
        assert_eq!(predictor.history().cell(OCTOBER, 72).unwrap().energy, WattHours(100.0));

        predictor.add_sample(Watts(800.0), at(18, 0) + TimeDelta::days(1));
        assert!(predictor.add_sample(Watts(0.0), at(18, 15) + TimeDelta::days(1)));
        let cell = predictor.history().cell(OCTOBER, 72).unwrap();
        assert_abs_diff_eq!(cell.energy.0, 120.0, epsilon = 1e-9);
        assert_eq!(cell.n_samples, 2);
    }

    #[test]
    fn correction_only_in_daylight_band() {
        let mut predictor = predictor();
        predictor.add_sample(Watts(400.0), at(18, 0));
        predictor.add_sample(Watts(400.0), at(18, 15));
        assert_eq!(predictor.correction(), WattHours::ZERO);

        predictor.add_sample(Watts(400.0), at(10, 0) + TimeDelta::days(1));
        predictor.add_sample(Watts(400.0), at(10, 15) + TimeDelta::days(1));
        assert!(predictor.correction() < WattHours::ZERO);
    }

    #[test]
    fn correction_is_flat_and_clamped() {
        let mut predictor = predictor();
        // Much more than the default at 10:00:
        predictor.add_sample(Watts(10_000.0), at(10, 0));
        predictor.add_sample(Watts(10_000.0), at(10, 15));
        let correction = predictor.correction();
        assert!(correction > WattHours::ZERO);

        let base = predictor.base_prediction(OCTOBER, 50);
        assert_abs_diff_eq!(predictor.predict(OCTOBER, 50).0, (base + correction).0, epsilon = 1e-9);
        // No production at night, whatever the correction is:
        assert_eq!(predictor.predict(OCTOBER, 4), WattHours::ZERO);
        // Capped at 3× the base:
        let early = predictor.base_prediction(OCTOBER, 27);
        assert_abs_diff_eq!(predictor.predict(OCTOBER, 27).0, early.0 * 3.0, epsilon = 1e-9);
    }

    #[test]
    fn correction_restarts_on_the_next_day() {
        let mut predictor = predictor();
        predictor.add_sample(Watts(10_000.0), at(12, 0));
        predictor.add_sample(Watts(10_000.0), at(12, 15));
        assert!(predictor.correction() > WattHours::ZERO);

        // The 12:15 quarter is committed on the same day, the 10:00 one on the next day:
        let next_day = at(10, 0) + TimeDelta::days(1);
        predictor.add_sample(Watts(4000.0), next_day);
        predictor.add_sample(Watts(4000.0), next_day + TimeDelta::minutes(15));

        let base = default_production(Watts(10_000.0), OCTOBER, 40);
        assert_abs_diff_eq!(predictor.correction().0, 0.3 * (1000.0 - base.0), epsilon = 1e-9);
    }

    #[test]
    fn outside_the_grid_is_default() {
        let predictor = predictor();
        assert_eq!(predictor.predict(MONTHS_PER_YEAR, 50), WattHours::ZERO);
        assert_eq!(predictor.predict(OCTOBER, QUARTERS_PER_DAY), WattHours::ZERO);
        assert!(!predictor.has_reliable_data(MONTHS_PER_YEAR));
        assert!(predictor.history().cell(MONTHS_PER_YEAR, 0).is_none());
    }

    #[test]
    fn reliable_data() {
        let mut predictor = predictor();
        let start = at(6, 0);
        for minutes in (0..=40 * 15).step_by(15) {
            predictor.add_sample(Watts(1000.0), start + TimeDelta::minutes(minutes));
        }
        assert!(predictor.has_reliable_data(OCTOBER));
        assert!(!predictor.has_reliable_data(OCTOBER + 1));
    }

    #[test]
    fn clear_keeps_installed_power() {
        let mut predictor = predictor();
        predictor.add_sample(Watts(1000.0), at(10, 0));
        predictor.add_sample(Watts(1000.0), at(10, 15));
        predictor.clear();
        assert_eq!(predictor.installed_power(), Watts(10_000.0));
        assert_eq!(predictor.history().cell(OCTOBER, 40).unwrap().n_samples, 0);
        assert_eq!(predictor.correction(), WattHours::ZERO);
    }
}
