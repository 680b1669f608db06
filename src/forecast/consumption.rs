use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{
    core::horizon::{DAYS_PER_WEEK, QUARTERS_PER_DAY, QUARTERS_PER_HOUR, day_of_week, quarter_of_day},
    forecast::{
        accumulator::{FinishedQuarter, QuarterAccumulator},
        correction::Correction,
    },
    prelude::*,
    quantity::{Zero, energy::{KilowattHours, WattHours}, power::Watts, time::Hours},
};

pub const WEEKS_OF_HISTORY: usize = 2;

const QUARTERS_PER_WEEK: usize = DAYS_PER_WEEK * QUARTERS_PER_DAY;

const CORRECTION_ALPHA: f64 = 0.3;

/// Propagation into the same quarter of the other days.
const CROSS_DAY_ALPHA: f64 = 0.12;

/// Propagation into the same quarter of the prior week.
const PRIOR_WEEK_ALPHA: f64 = 0.25;

/// Propagation into the neighbouring quarters of the same day, divided by `1 + |offset|`.
const NEIGHBOR_WEIGHT: f64 = 0.20;
const MAX_NEIGHBOR_OFFSET: usize = 4;

/// Correction fades with `exp(-distance / CORRECTION_DECAY)` quarters.
const CORRECTION_DECAY: f64 = 24.0;

const REALTIME_ALPHA: f64 = 0.2;
const REALTIME_DECAY: f64 = 12.0;
const MAX_REALTIME_WEIGHT: f64 = 0.8;

/// Real-time power is only blended in within 12 hours.
const MAX_REALTIME_DISTANCE: usize = 48;

const MIN_PREDICTION_FACTOR: f64 = 0.1;
const MAX_PREDICTION_FACTOR: f64 = 10.0;

/// Typical household consumption in the quarter, when nothing has been learned yet.
pub fn default_consumption(quarter: usize) -> WattHours {
    let hourly = match quarter / QUARTERS_PER_HOUR {
        0..6 => 300.0,
        6..9 => 1200.0,
        9..12 => 500.0,
        12..14 => 1000.0,
        14..17 => 500.0,
        17..21 => 1500.0,
        _ => 600.0,
    };
    WattHours(hourly) * Hours::QUARTER.0
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionCell {
    pub energy: WattHours,
    pub has_data: bool,
}

impl ConsumptionCell {
    fn empty(quarter: usize) -> Self {
        Self { energy: default_consumption(quarter), has_data: false }
    }

    fn blend(&mut self, energy: WattHours, alpha: f64) {
        self.energy += (energy - self.energy) * alpha;
    }
}

type Week = [[ConsumptionCell; QUARTERS_PER_DAY]; DAYS_PER_WEEK];

fn empty_week() -> Week {
    std::array::from_fn(|_| std::array::from_fn(ConsumptionCell::empty))
}

/// Two weeks of per-quarter consumption: week `0` is the current one, week `1` is the prior one.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionHistory {
    #[serde_as(as = "[[[_; 96]; 7]; 2]")]
    weeks: [Week; WEEKS_OF_HISTORY],

    /// ISO week number of the last sample.
    last_week: Option<u32>,
}

impl Default for ConsumptionHistory {
    fn default() -> Self {
        Self { weeks: [empty_week(), empty_week()], last_week: None }
    }
}

impl ConsumptionHistory {
    /// Cell of the week, `None` for the indices outside the grid.
    #[must_use]
    pub fn cell(&self, week: usize, day: usize, quarter: usize) -> Option<&ConsumptionCell> {
        self.weeks.get(week)?.get(day)?.get(quarter)
    }

    #[must_use]
    pub const fn last_week(&self) -> Option<u32> {
        self.last_week
    }

    /// Mean of the weekly samples, or the default when there is none.
    pub fn base_prediction(&self, day: usize, quarter: usize) -> WattHours {
        let (total, n_weeks) = (0..WEEKS_OF_HISTORY)
            .filter_map(|week| self.cell(week, day, quarter))
            .filter(|cell| cell.has_data)
            .fold((WattHours::ZERO, 0_u32), |(total, n), cell| (total + cell.energy, n + 1));
        if n_weeks == 0 { default_consumption(quarter) } else { total / f64::from(n_weeks) }
    }

    #[must_use]
    pub fn has_data_for(&self, day: usize, quarter: usize) -> bool {
        (0..WEEKS_OF_HISTORY).any(|week| self.cell(week, day, quarter).is_some_and(|cell| cell.has_data))
    }

    #[must_use]
    pub fn has_data_for_day(&self, day: usize) -> bool {
        (0..QUARTERS_PER_DAY).any(|quarter| self.has_data_for(day, quarter))
    }

    /// Move the current week into the prior one when the ISO week changes.
    fn observe_week(&mut self, week: u32) {
        if self.last_week.is_some_and(|last_week| last_week != week) {
            info!(from = ?self.last_week, to = week, "new week, shifting the consumption history");
            self.weeks[1] = self.weeks[0];
            self.weeks[0] = empty_week();
        }
        self.last_week = Some(week);
    }

    /// Write the committed energy and spread it into the related cells.
    fn record(&mut self, day: usize, quarter: usize, energy: WattHours) {
        self.weeks[0][day][quarter] = ConsumptionCell { energy, has_data: true };

        // Daily-recurring patterns:
        for other_day in (0..DAYS_PER_WEEK).filter(|other_day| *other_day != day) {
            for week in &mut self.weeks {
                let cell = &mut week[other_day][quarter];
                if cell.has_data {
                    cell.blend(energy, CROSS_DAY_ALPHA);
                }
            }
        }

        // Same day, nearby quarters:
        for offset in 1..=MAX_NEIGHBOR_OFFSET {
            #[expect(clippy::cast_precision_loss)]
            let weight = NEIGHBOR_WEIGHT / (1 + offset) as f64;
            for neighbor in [quarter.checked_sub(offset), Some(quarter + offset)].into_iter().flatten() {
                if let Some(cell) = self.weeks[0][day].get_mut(neighbor)
                    && cell.has_data
                {
                    cell.blend(energy, weight);
                }
            }
        }

        let prior = &mut self.weeks[1][day][quarter];
        if prior.has_data {
            prior.blend(energy, PRIOR_WEEK_ALPHA);
        } else {
            *prior = ConsumptionCell { energy, has_data: true };
        }
    }
}

/// Learns household consumption per day-of-week and quarter-of-day.
#[derive(Clone, Debug)]
pub struct ConsumptionPredictor {
    history: ConsumptionHistory,
    accumulator: QuarterAccumulator,
    correction: Correction,

    /// Smoothed raw load power.
    realtime_power: Option<Watts>,
}

impl Default for ConsumptionPredictor {
    fn default() -> Self {
        Self::new(ConsumptionHistory::default())
    }
}

impl ConsumptionPredictor {
    pub const fn new(history: ConsumptionHistory) -> Self {
        Self {
            history,
            accumulator: QuarterAccumulator::new(),
            correction: Correction::new(CORRECTION_ALPHA),
            realtime_power: None,
        }
    }

    #[must_use]
    pub const fn history(&self) -> &ConsumptionHistory {
        &self.history
    }

    /// Feed the load power sample.
    ///
    /// Returns `true` when the sample finished a quarter, and the quarter has been committed.
    pub fn add_sample(&mut self, power: Watts, timestamp: NaiveDateTime) -> bool {
        if !power.is_finite() {
            warn!(?power, %timestamp, "ignoring non-finite load power");
            return false;
        }
        let power = power.max(Watts::ZERO);
        self.realtime_power = Some(
            self.realtime_power
                .map_or(power, |realtime_power| realtime_power + (power - realtime_power) * REALTIME_ALPHA),
        );
        let finished = self.accumulator.push(power, timestamp);
        if let Some(finished) = finished {
            self.commit(finished);
        }
        self.history.observe_week(timestamp.iso_week().week());
        finished.is_some()
    }

    fn commit(&mut self, finished: FinishedQuarter) {
        let day = day_of_week(&finished.date);
        let quarter = finished.quarter_of_day;
        let energy = finished.mean_power * Hours::QUARTER;

        self.correction.roll_over(finished.date);
        let base = self.history.base_prediction(day, quarter);
        self.correction.update(energy - base);
        self.history.record(day, quarter, energy);

        debug!(
            date = %finished.date,
            day,
            quarter,
            %energy,
            %base,
            correction = %self.correction.error(),
            "committed consumption",
        );
    }

    pub fn base_prediction(&self, day: usize, quarter: usize) -> WattHours {
        self.history.base_prediction(day, quarter)
    }

    /// Correction contribution for a quarter `distance` quarters ahead.
    pub fn correction_at(&self, distance: usize) -> WattHours {
        #[expect(clippy::cast_precision_loss)]
        let decay = (-(distance as f64) / CORRECTION_DECAY).exp();
        self.correction.error() * decay
    }

    /// Predict consumption of the quarter that is `distance` quarters ahead of now.
    pub fn predict(&self, day: usize, quarter: usize, distance: usize) -> WattHours {
        let base = self.history.base_prediction(day, quarter);
        let mut prediction = base + self.correction_at(distance);
        if let Some(realtime_power) = self.realtime_power
            && distance < MAX_REALTIME_DISTANCE
        {
            let estimate = realtime_power * Hours::QUARTER;
            if estimate > prediction {
                #[expect(clippy::cast_precision_loss)]
                let weight = (-(distance as f64) / REALTIME_DECAY).exp().min(MAX_REALTIME_WEIGHT);
                prediction = prediction * (1.0 - weight) + estimate * weight;
            }
        }
        prediction.clamp(base * MIN_PREDICTION_FACTOR, base * MAX_PREDICTION_FACTOR)
    }

    /// Predict consumption of the quarter, measuring the distance from `now`.
    pub fn predict_from(&self, day: usize, quarter: usize, now: NaiveDateTime) -> WattHours {
        let from = day_of_week(&now) * QUARTERS_PER_DAY + quarter_of_day(&now);
        let to = day * QUARTERS_PER_DAY + quarter;
        self.predict(day, quarter, (to + QUARTERS_PER_WEEK - from) % QUARTERS_PER_WEEK)
    }

    pub fn predict_hourly(&self, day: usize, hour: usize, now: NaiveDateTime) -> WattHours {
        (hour * QUARTERS_PER_HOUR..(hour + 1) * QUARTERS_PER_HOUR)
            .map(|quarter| self.predict_from(day, quarter, now))
            .sum()
    }

    /// Consumption from the current quarter till midnight.
    pub fn predict_remaining_day(&self, now: NaiveDateTime) -> KilowattHours {
        let day = day_of_week(&now);
        (quarter_of_day(&now)..QUARTERS_PER_DAY)
            .map(|quarter| self.predict_from(day, quarter, now))
            .sum::<WattHours>()
            .into()
    }

    /// Consumption of the next quarters starting with the current one, wrapping over days and weeks.
    pub fn predict_next_quarters(&self, now: NaiveDateTime, n_quarters: usize) -> KilowattHours {
        let start = day_of_week(&now) * QUARTERS_PER_DAY + quarter_of_day(&now);
        (0..n_quarters)
            .map(|distance| {
                let position = (start + distance) % QUARTERS_PER_WEEK;
                self.predict(position / QUARTERS_PER_DAY, position % QUARTERS_PER_DAY, distance)
            })
            .sum::<WattHours>()
            .into()
    }

    /// Mean daily consumption over the days with data, or the default day.
    pub fn average_daily_consumption(&self) -> KilowattHours {
        let day_total = |day: usize| -> WattHours {
            (0..QUARTERS_PER_DAY).map(|quarter| self.history.base_prediction(day, quarter)).sum()
        };
        let (total, n_days) = (0..DAYS_PER_WEEK)
            .filter(|day| self.history.has_data_for_day(*day))
            .fold((WattHours::ZERO, 0_u32), |(total, n), day| (total + day_total(day), n + 1));
        if n_days == 0 {
            (0..QUARTERS_PER_DAY).map(default_consumption).sum::<WattHours>().into()
        } else {
            (total / f64::from(n_days)).into()
        }
    }

    /// Number of cells with data across both weeks.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.history.weeks.iter().flatten().flatten().filter(|cell| cell.has_data).count()
    }

    /// Every day of the week has at least some data.
    #[must_use]
    pub fn has_reliable_data(&self) -> bool {
        (0..DAYS_PER_WEEK).all(|day| self.history.has_data_for_day(day))
    }

    #[must_use]
    pub fn has_data_for(&self, day: usize, quarter: usize) -> bool {
        self.history.has_data_for(day, quarter)
    }

    pub const fn correction(&self) -> WattHours {
        self.correction.error()
    }

    pub fn reset_correction(&mut self) {
        self.correction.reset();
    }

    /// Forget everything learned.
    pub fn clear(&mut self) {
        info!("clearing the consumption history");
        *self = Self::default();
    }
}
