use chrono::NaiveDate;

use crate::{
    prelude::*,
    quantity::{Zero, energy::WattHours},
};

/// Exponentially smoothed prediction error, reset at midnight.
#[derive(Copy, Clone, Debug)]
pub struct Correction {
    alpha: f64,
    error: WattHours,
    last_date: Option<NaiveDate>,
}

impl Correction {
    pub const fn new(alpha: f64) -> Self {
        Self { alpha, error: WattHours::ZERO, last_date: None }
    }

    pub const fn error(&self) -> WattHours {
        self.error
    }

    /// Start over if the date has changed since the last call.
    pub fn roll_over(&mut self, date: NaiveDate) {
        if self.last_date.is_some_and(|last_date| last_date != date) {
            debug!(%date, error = %self.error, "resetting the correction at midnight");
            self.error = WattHours::ZERO;
        }
        self.last_date = Some(date);
    }

    pub fn update(&mut self, error: WattHours) {
        self.error = error * self.alpha + self.error * (1.0 - self.alpha);
    }

    pub fn reset(&mut self) {
        self.error = WattHours::ZERO;
    }
}
