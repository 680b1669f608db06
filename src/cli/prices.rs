use std::{fs, path::Path};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    core::{
        horizon::QUARTERS_PER_DAY,
        prices::{PriceCurve, RetailCoefficients},
    },
    prelude::*,
    quantity::rate::KilowattHourRate,
};

/// Day-ahead spot prices as published by the market, per kilowatt-hour.
#[derive(Deserialize)]
pub struct PriceFile {
    pub currency: String,

    /// Day of the `today` prices, defaults to the current day.
    #[serde(default)]
    pub date: Option<NaiveDate>,

    pub today: Vec<KilowattHourRate>,

    #[serde(default)]
    pub tomorrow: Option<Vec<KilowattHourRate>>,
}

impl PriceFile {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read_from(path: &Path) -> Result<Self> {
        serde_json::from_slice(&fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))?)
            .with_context(|| format!("failed to parse `{}`", path.display()))
    }

    pub fn into_curve(self, today: NaiveDate, retail: RetailCoefficients) -> Result<PriceCurve> {
        ensure!(
            self.today.len() == QUARTERS_PER_DAY,
            "expected {QUARTERS_PER_DAY} prices for today, got {}",
            self.today.len(),
        );
        let mut spot = self.today;
        if let Some(tomorrow) = self.tomorrow {
            ensure!(
                tomorrow.len() == QUARTERS_PER_DAY,
                "expected {QUARTERS_PER_DAY} prices for tomorrow, got {}",
                tomorrow.len(),
            );
            spot.extend(tomorrow);
        }
        let curve = PriceCurve::try_new(self.date.unwrap_or(today), self.currency, spot, retail)?;
        debug!(first_day = %curve.first_day(), n_quarters = curve.len(), currency = curve.currency(), "loaded the prices");
        Ok(curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_file(n_today: usize, n_tomorrow: Option<usize>) -> String {
        let prices = |n: usize| format!("[{}]", vec!["2.5"; n].join(", "));
        let tomorrow = n_tomorrow.map_or_else(String::new, |n| format!(r#", "tomorrow": {}"#, prices(n)));
        format!(r#"{{"currency": "CZK", "today": {}{tomorrow}}}"#, prices(n_today))
    }

    #[test]
    fn today_and_tomorrow() {
        let file: PriceFile = serde_json::from_str(&price_file(96, Some(96))).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let curve = file.into_curve(today, RetailCoefficients::default()).unwrap();
        assert_eq!(curve.len(), 192);
        assert_eq!(curve.first_day(), today);
        assert_eq!(curve.currency(), "CZK");
        assert_eq!(curve.spot(191), KilowattHourRate(2.5));
    }

    #[test]
    fn today_only() {
        let file: PriceFile = serde_json::from_str(&price_file(96, None)).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        assert_eq!(file.into_curve(today, RetailCoefficients::default()).unwrap().len(), 96);
    }

    #[test]
    fn incomplete_day() {
        let file: PriceFile = serde_json::from_str(&price_file(96, Some(24))).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        assert!(file.into_curve(today, RetailCoefficients::default()).is_err());
    }
}
