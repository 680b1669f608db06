use crate::{
    core::horizon::HorizonQuarter,
    quantity::{Zero, energy::KilowattHours, rate::KilowattHourRate},
};

/// Forecast and prices of a single quarter.
#[derive(Copy, Clone, Debug)]
pub struct QuarterForecast {
    pub quarter: HorizonQuarter,
    pub production: KilowattHours,
    pub consumption: KilowattHours,
    pub spot_price: KilowattHourRate,
    pub buy_price: KilowattHourRate,
    pub sell_price: KilowattHourRate,
}

/// Statistics over the quarters strictly after the current one.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Outlook {
    pub min_buy_price: KilowattHourRate,
    pub mean_buy_price: KilowattHourRate,
    pub max_buy_price: KilowattHourRate,
    pub max_sell_price: KilowattHourRate,
    pub production: KilowattHours,
    pub consumption: KilowattHours,
}

impl Outlook {
    /// Remaining consumption not covered by the remaining production.
    pub fn deficit(&self) -> KilowattHours {
        (self.consumption - self.production).max(KilowattHours::ZERO)
    }

    #[must_use]
    pub fn has_deficit(&self) -> bool {
        self.consumption > self.production
    }

    #[must_use]
    pub fn has_surplus(&self) -> bool {
        self.production > self.consumption
    }
}

/// Build the outlook for each quarter in a single backward pass.
///
/// The last quarter has no future, so it sees its own prices and no remaining energy.
pub fn build_outlooks(forecasts: &[QuarterForecast]) -> Vec<Outlook> {
    let mut accumulator: Option<Accumulator> = None;
    let mut outlooks = Vec::with_capacity(forecasts.len());
    for forecast in forecasts.iter().rev() {
        outlooks.push(accumulator.as_ref().map_or_else(
            || Outlook {
                min_buy_price: forecast.buy_price,
                mean_buy_price: forecast.buy_price,
                max_buy_price: forecast.buy_price,
                max_sell_price: forecast.sell_price,
                production: KilowattHours::ZERO,
                consumption: KilowattHours::ZERO,
            },
            Accumulator::outlook,
        ));
        accumulator.get_or_insert_with(|| Accumulator::new(forecast)).push(forecast);
    }
    outlooks.reverse();
    outlooks
}

struct Accumulator {
    min_buy_price: KilowattHourRate,
    max_buy_price: KilowattHourRate,
    total_buy_price: KilowattHourRate,
    max_sell_price: KilowattHourRate,
    production: KilowattHours,
    consumption: KilowattHours,
    n_quarters: usize,
}

impl Accumulator {
    const fn new(forecast: &QuarterForecast) -> Self {
        Self {
            min_buy_price: forecast.buy_price,
            max_buy_price: forecast.buy_price,
            total_buy_price: KilowattHourRate::ZERO,
            max_sell_price: forecast.sell_price,
            production: KilowattHours::ZERO,
            consumption: KilowattHours::ZERO,
            n_quarters: 0,
        }
    }

    fn push(&mut self, forecast: &QuarterForecast) {
        self.min_buy_price = self.min_buy_price.min(forecast.buy_price);
        self.max_buy_price = self.max_buy_price.max(forecast.buy_price);
        self.total_buy_price += forecast.buy_price;
        self.max_sell_price = self.max_sell_price.max(forecast.sell_price);
        self.production += forecast.production;
        self.consumption += forecast.consumption;
        self.n_quarters += 1;
    }

    #[expect(clippy::cast_precision_loss)]
    fn outlook(&self) -> Outlook {
        Outlook {
            min_buy_price: self.min_buy_price,
            mean_buy_price: self.total_buy_price / self.n_quarters as f64,
            max_buy_price: self.max_buy_price,
            max_sell_price: self.max_sell_price,
            production: self.production,
            consumption: self.consumption,
        }
    }
}
