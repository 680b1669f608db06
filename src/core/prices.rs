use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{core::horizon::MAX_HORIZON, prelude::*, quantity::rate::KilowattHourRate};

/// Linear retail price model on top of the spot price: `price = multiplier * spot + offset`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetailCoefficients {
    pub buy_multiplier: f64,
    pub buy_offset: KilowattHourRate,
    pub sell_multiplier: f64,
    pub sell_offset: KilowattHourRate,
}

impl Default for RetailCoefficients {
    fn default() -> Self {
        Self {
            buy_multiplier: 1.21,
            buy_offset: KilowattHourRate(2.5),
            sell_multiplier: 0.9,
            sell_offset: KilowattHourRate(0.0),
        }
    }
}

impl RetailCoefficients {
    pub fn buy_price(&self, spot: KilowattHourRate) -> KilowattHourRate {
        spot * self.buy_multiplier + self.buy_offset
    }

    pub fn sell_price(&self, spot: KilowattHourRate) -> KilowattHourRate {
        spot * self.sell_multiplier + self.sell_offset
    }
}

/// Quarter-hourly spot prices starting at midnight of [`PriceCurve::first_day`].
#[must_use]
#[derive(Clone, Debug)]
pub struct PriceCurve {
    first_day: NaiveDate,
    currency: String,
    spot: Vec<KilowattHourRate>,
    retail: RetailCoefficients,
}

impl PriceCurve {
    pub fn try_new(
        first_day: NaiveDate,
        currency: impl Into<String>,
        spot: Vec<KilowattHourRate>,
        retail: RetailCoefficients,
    ) -> Result<Self> {
        ensure!(!spot.is_empty(), "the price curve is empty");
        ensure!(
            spot.len() <= MAX_HORIZON,
            "the price curve has {} quarters, at most {MAX_HORIZON} are supported",
            spot.len(),
        );
        if let Some(index) = spot.iter().position(|price| !price.is_finite()) {
            bail!("the spot price at quarter #{index} is not finite");
        }
        ensure!(
            retail.buy_multiplier.is_finite()
                && retail.sell_multiplier.is_finite()
                && retail.buy_offset.is_finite()
                && retail.sell_offset.is_finite(),
            "retail coefficients must be finite",
        );
        Ok(Self { first_day, currency: currency.into(), spot, retail })
    }

    pub const fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.spot.len()
    }

    pub fn spot(&self, index: usize) -> KilowattHourRate {
        self.spot[index]
    }

    pub fn buy_price(&self, index: usize) -> KilowattHourRate {
        self.retail.buy_price(self.spot[index])
    }

    pub fn sell_price(&self, index: usize) -> KilowattHourRate {
        self.retail.sell_price(self.spot[index])
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn first_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    #[test]
    fn retail_prices() {
        let curve = PriceCurve::try_new(
            first_day(),
            "CZK",
            vec![KilowattHourRate(2.0)],
            RetailCoefficients::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(curve.buy_price(0).0, 4.92, epsilon = 1e-9);
        assert_abs_diff_eq!(curve.sell_price(0).0, 1.8, epsilon = 1e-9);
        assert_eq!(curve.currency(), "CZK");
    }

    #[test]
    fn rejects_empty_curve() {
        assert!(PriceCurve::try_new(first_day(), "EUR", vec![], RetailCoefficients::default()).is_err());
    }

    #[test]
    fn rejects_too_long_curve() {
        let spot = vec![KilowattHourRate(1.0); MAX_HORIZON + 1];
        assert!(PriceCurve::try_new(first_day(), "EUR", spot, RetailCoefficients::default()).is_err());
    }

    #[test]
    fn rejects_non_finite_price() {
        let spot = vec![KilowattHourRate(1.0), KilowattHourRate(f64::NAN)];
        assert!(PriceCurve::try_new(first_day(), "EUR", spot, RetailCoefficients::default()).is_err());
    }
}
