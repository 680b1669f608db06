mod accumulator;
pub mod consumption;
mod correction;
pub mod production;

use crate::{
    core::horizon::{EnergyForecast, HorizonQuarter},
    forecast::{consumption::ConsumptionPredictor, production::ProductionPredictor},
    quantity::energy::KilowattHours,
};

/// Learned predictors plugged into the simulator.
#[derive(Copy, Clone)]
pub struct Predictors<'a> {
    pub consumption: &'a ConsumptionPredictor,
    pub production: &'a ProductionPredictor,
}

impl EnergyForecast for Predictors<'_> {
    fn consumption(&self, quarter: &HorizonQuarter) -> KilowattHours {
        self.consumption.predict(quarter.day_of_week, quarter.quarter_of_day, quarter.distance).into()
    }

    fn production(&self, quarter: &HorizonQuarter) -> KilowattHours {
        self.production.predict(quarter.month, quarter.quarter_of_day).into()
    }
}
