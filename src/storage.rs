use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    forecast::{consumption::ConsumptionHistory, production::ProductionHistory},
    prelude::*,
};

/// JSON files with the learned histories.
#[must_use]
pub struct HistoryStore {
    directory: PathBuf,
}

impl HistoryStore {
    const CONSUMPTION: &'static str = "consumption.json";
    const PRODUCTION: &'static str = "production.json";

    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn load_consumption(&self) -> ConsumptionHistory {
        self.read_or_default(Self::CONSUMPTION)
    }

    pub fn load_production(&self) -> ProductionHistory {
        self.read_or_default(Self::PRODUCTION)
    }

    pub fn save_consumption(&self, history: &ConsumptionHistory) -> Result {
        self.write(Self::CONSUMPTION, history)
    }

    pub fn save_production(&self, history: &ProductionHistory) -> Result {
        self.write(Self::PRODUCTION, history)
    }

    /// Missing or broken history is not fatal: the predictors fall back to their defaults.
    #[instrument(skip_all, fields(directory = %self.directory.display(), file = name))]
    fn read_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.directory.join(name);
        Self::read_fallibly(&path).unwrap_or_else(|error| {
            error!("failed to load the history, starting over: {error:#}");
            T::default()
        })
    }

    fn read_fallibly<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
        if path.is_file() {
            Ok(serde_json::from_slice(&fs::read(path)?)?)
        } else {
            info!("no history yet");
            Ok(T::default())
        }
    }

    #[instrument(skip_all, fields(directory = %self.directory.display(), file = name))]
    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result {
        fs::create_dir_all(&self.directory)
            .with_context(|| format!("failed to create `{}`", self.directory.display()))?;
        let path = self.directory.join(name);
        fs::write(&path, serde_json::to_vec(value)?)
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        debug!("saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        core::horizon::{DAYS_PER_WEEK, MONTHS_PER_YEAR, QUARTERS_PER_DAY},
        forecast::{
            consumption::{ConsumptionPredictor, WEEKS_OF_HISTORY},
            production::ProductionPredictor,
        },
        quantity::power::Watts,
    };

    fn scratch_directory(name: &str) -> PathBuf {
        let directory = std::env::temp_dir().join(format!("sunwise-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&directory);
        directory
    }

    #[test]
    fn missing_history_is_default() {
        let store = HistoryStore::new(scratch_directory("missing"));
        assert_eq!(store.load_consumption(), ConsumptionHistory::default());
        assert_eq!(store.load_production(), ProductionHistory::default());
    }

    #[test]
    fn broken_history_is_default() {
        let directory = scratch_directory("broken");
        fs::create_dir_all(&directory).unwrap();
        fs::write(directory.join(HistoryStore::CONSUMPTION), "{").unwrap();
        assert_eq!(HistoryStore::new(&directory).load_consumption(), ConsumptionHistory::default());
        fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn round_trip_is_exact() {
        let start = NaiveDate::from_ymd_opt(2025, 10, 13).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut consumption = ConsumptionPredictor::default();
        let mut production = ProductionPredictor::new(ProductionHistory::default(), Watts(5000.0));
        for step in 0..(7 * 24 * 12) {
            let timestamp = start + chrono::TimeDelta::minutes(5 * i64::from(step));
            let phase = f64::from(step);
            consumption.add_sample(Watts(350.0 + 1234.567 * (phase * 0.37).sin().abs()), timestamp);
            production.add_sample(Watts(3217.89 * (phase * 0.011).sin().max(0.0)), timestamp);
        }
        assert!(consumption.n_samples() > 0);

        let directory = scratch_directory("round-trip");
        let store = HistoryStore::new(&directory);
        store.save_consumption(consumption.history()).unwrap();
        store.save_production(production.history()).unwrap();
        let loaded_consumption = store.load_consumption();
        let loaded_production = store.load_production();
        fs::remove_dir_all(&directory).unwrap();

        assert_eq!(loaded_consumption.last_week(), consumption.history().last_week());
        for week in 0..WEEKS_OF_HISTORY {
            for day in 0..DAYS_PER_WEEK {
                for quarter in 0..QUARTERS_PER_DAY {
                    let expected = consumption.history().cell(week, day, quarter).unwrap();
                    let actual = loaded_consumption.cell(week, day, quarter).unwrap();
                    assert_eq!(actual.energy.0.to_bits(), expected.energy.0.to_bits(), "{week} {day} {quarter}");
                    assert_eq!(actual.has_data, expected.has_data);
                }
            }
        }
        for month in 0..MONTHS_PER_YEAR {
            for quarter in 0..QUARTERS_PER_DAY {
                let expected = production.history().cell(month, quarter).unwrap();
                let actual = loaded_production.cell(month, quarter).unwrap();
                assert_eq!(actual.energy.0.to_bits(), expected.energy.0.to_bits(), "{month} {quarter}");
                assert_eq!(actual.n_samples, expected.n_samples);
            }
        }
    }
}
